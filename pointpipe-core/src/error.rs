use thiserror::Error;

use crate::layout::DimensionKind;

/// The error taxonomy shared by all pipeline components.
///
/// Decoders and iterators fail fast with one of these variants instead of attempting
/// best-effort recovery, since silently continuing on a malformed binary layout risks
/// misinterpreting all subsequent bytes. All variants are fatal to the current operation;
/// none is retried internally.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The fixed header block is structurally broken (bad signature, bad size)
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The declared offset to the point data lies inside the header, so there is no
    /// way to know where point reading should begin
    #[error(
        "the offset to the start of point data ({data_offset}) is smaller than the \
         header size ({header_size})"
    )]
    InvalidDataOffset { data_offset: u32, header_size: u16 },

    /// The point data format id (low 6 bits of the format byte) is outside the
    /// supported range 0-5
    #[error("invalid point data format {0}")]
    InvalidPointFormat(u8),

    /// The two compression selector bits of the format byte carry the impossible
    /// combination (0,1)
    #[error("invalid point compression flag")]
    InvalidCompressionFlag,

    /// The file was compressed with the early, experimental compression scheme that
    /// predates the released format and is not supported
    #[error("this file was compressed with an early, experimental compression scheme that is not supported")]
    LegacyExperimentalCompression,

    /// The declared point count does not match the count derived from the file size
    #[error(
        "the header-declared point count ({declared}) does not match the point count \
         computed by subtracting the data offset from the file length and dividing by \
         the point record length ({computed}, with a remainder of {remainder} bytes)"
    )]
    PointCountMismatch {
        declared: u64,
        computed: u64,
        remainder: u64,
    },

    /// The point source ran out of data although the declared stage point count
    /// promised more points
    #[error("the point source ran out of data before the declared point count was reached")]
    UnexpectedEndOfStream,

    /// An iterator kind was requested that the stage does not support
    #[error("stage '{stage}' does not support {mode} iteration")]
    UnsupportedAccessMode {
        stage: &'static str,
        mode: &'static str,
    },

    #[error("not yet implemented: {0}")]
    NotYetImplemented(&'static str),

    /// A point or dimension index is outside the valid range of a buffer or schema
    #[error("{what} index {index} is out of range (limit is {limit})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        limit: usize,
    },

    /// A dimension kind was looked up that was never registered with the schema
    #[error("dimension {0:?} is not part of this schema")]
    UnknownDimension(DimensionKind),
}
