use std::io::{ErrorKind, Read, Seek, SeekFrom};

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};
use uuid::Uuid;

use pointpipe_core::error::PipelineError;
use pointpipe_core::layout::{
    format_has_colors, format_has_gps_time, format_has_waveform, Schema,
};
use pointpipe_core::math::Bounds;
use pointpipe_core::nalgebra::{Point3, Vector3};

/// The 4-byte magic every LAS file starts with
pub const LAS_FILE_SIGNATURE: [u8; 4] = *b"LASF";

/// Size in bytes of the fixed header block
pub const LAS_HEADER_SIZE: u16 = 227;

// The 1.0-style pad signature some legacy writers leave right before the point data
const PAD_SIGNATURE: [u8; 2] = [0xCC, 0xDD];

/// A variable length record: an optional metadata block following the fixed header.
/// A file declares zero or more of these; the payload is kept as raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Vlr {
    pub reserved: u16,
    pub user_id: String,
    pub record_id: u16,
    pub description: String,
    pub data: Vec<u8>,
}

impl Vlr {
    /// Returns the payload length in bytes, as declared by the record-length-after-header field
    pub fn record_length(&self) -> u16 {
        self.data.len() as u16
    }
}

/// The decoded file-level metadata of a LAS file. Parsed once when the owning reader
/// stage opens its byte stream and never mutated afterwards.
///
/// The stored data offset is the *effective* one: if the legacy pad signature was
/// found at the declared offset, the offset already includes the 2-byte fixup.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    file_source_id: u16,
    reserved: u16,
    project_id: Uuid,
    version_major: u8,
    version_minor: u8,
    system_id: String,
    software_id: String,
    creation_day_of_year: u16,
    creation_year: u16,
    header_size: u16,
    data_offset: u32,
    point_format: u8,
    compressed: bool,
    point_record_length: u16,
    point_count: u32,
    points_by_return: [u32; 5],
    scale: Vector3<f64>,
    offset: Vector3<f64>,
    bounds: Bounds,
    vlrs: Vec<Vlr>,
}

impl Header {
    /// Decodes a LAS header from the given byte stream.
    ///
    /// The fixed block is read field by field in little-endian byte order, validating
    /// each field as it is consumed. After the fixed block this probes for the legacy
    /// pad signature at the declared data offset, reads the declared number of
    /// variable length records and finally leaves the stream positioned at the
    /// effective data offset, so point reading can start right away.
    ///
    /// Decoding the same bytes twice yields identical `Header` values.
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> Result<Header> {
        reader.seek(SeekFrom::Start(0))?;

        let mut signature = [0u8; 4];
        reader
            .read_exact(&mut signature)
            .context("failed to read file signature")?;
        if signature != LAS_FILE_SIGNATURE {
            return Err(PipelineError::MalformedHeader(format!(
                "file signature {:?} does not match \"LASF\"",
                signature
            ))
            .into());
        }

        let file_source_id = reader.read_u16::<LittleEndian>()?;
        let reserved = reader.read_u16::<LittleEndian>()?;

        let mut project_id_raw = [0u8; 16];
        reader.read_exact(&mut project_id_raw)?;
        let project_id = Uuid::from_bytes(project_id_raw);

        let version_major = reader.read_u8()?;
        let version_minor = reader.read_u8()?;

        let system_id = read_fixed_string(reader, 32).context("failed to read system id")?;
        let software_id = read_fixed_string(reader, 32).context("failed to read software id")?;

        let creation_day_of_year = reader.read_u16::<LittleEndian>()?;
        let creation_year = reader.read_u16::<LittleEndian>()?;

        let header_size = reader.read_u16::<LittleEndian>()?;
        if header_size < LAS_HEADER_SIZE {
            return Err(PipelineError::MalformedHeader(format!(
                "header size {} is smaller than the fixed header block of {} bytes",
                header_size, LAS_HEADER_SIZE
            ))
            .into());
        }

        // If the point data starts inside the header there is no way to know where
        // point reading should begin, so this is unrecoverable
        let mut data_offset = reader.read_u32::<LittleEndian>()?;
        if data_offset < header_size as u32 {
            return Err(PipelineError::InvalidDataOffset {
                data_offset,
                header_size,
            }
            .into());
        }

        let vlr_count = reader.read_u32::<LittleEndian>()?;

        let format_byte = reader.read_u8()?;
        let compressed = decode_compression_flags(format_byte)?;
        let point_format = format_byte & 0x3f;
        if point_format > 5 {
            return Err(PipelineError::InvalidPointFormat(point_format).into());
        }

        let point_record_length = reader.read_u16::<LittleEndian>()?;
        let point_count = reader.read_u32::<LittleEndian>()?;

        // A few revisions of the format had 7 per-return counts, but the settled
        // layout is always 5 entries
        let mut points_by_return = [0u32; 5];
        for entry in points_by_return.iter_mut() {
            *entry = reader.read_u32::<LittleEndian>()?;
        }

        let scale = Vector3::new(
            reader.read_f64::<LittleEndian>()?,
            reader.read_f64::<LittleEndian>()?,
            reader.read_f64::<LittleEndian>()?,
        );
        let offset = Vector3::new(
            reader.read_f64::<LittleEndian>()?,
            reader.read_f64::<LittleEndian>()?,
            reader.read_f64::<LittleEndian>()?,
        );

        // Extents are stored max-then-min per axis
        let max_x = reader.read_f64::<LittleEndian>()?;
        let min_x = reader.read_f64::<LittleEndian>()?;
        let max_y = reader.read_f64::<LittleEndian>()?;
        let min_y = reader.read_f64::<LittleEndian>()?;
        let max_z = reader.read_f64::<LittleEndian>()?;
        let min_z = reader.read_f64::<LittleEndian>()?;
        let bounds = Bounds::from_min_max_unchecked(
            Point3::new(min_x, min_y, min_z),
            Point3::new(max_x, max_y, max_z),
        );

        // Some legacy writers put 1.0-style pad bytes at the end of the header but
        // declare an offset that points at the pad instead of past it. Probe for the
        // signature and shift the effective offset if it is there
        reader.seek(SeekFrom::Start(data_offset as u64))?;
        if has_pad_signature(reader)? {
            warn!(
                "found a legacy pad signature at the declared data offset {}; shifting the \
                 effective data offset by 2 bytes",
                data_offset
            );
            data_offset += 2;
        }

        let vlrs = if vlr_count > 0 {
            reader.seek(SeekFrom::Start(header_size as u64))?;
            read_vlrs(reader, vlr_count)?
        } else {
            Vec::new()
        };

        // Leave the stream where point reading resumes
        reader.seek(SeekFrom::Start(data_offset as u64))?;

        debug!(
            "decoded LAS header: version {}.{}, point format {}, {} point(s), {} VLR(s){}",
            version_major,
            version_minor,
            point_format,
            point_count,
            vlrs.len(),
            if compressed { ", compressed" } else { "" }
        );

        Ok(Header {
            file_source_id,
            reserved,
            project_id,
            version_major,
            version_minor,
            system_id,
            software_id,
            creation_day_of_year,
            creation_year,
            header_size,
            data_offset,
            point_format,
            compressed,
            point_record_length,
            point_count,
            points_by_return,
            scale,
            offset,
            bounds,
            vlrs,
        })
    }

    /// Checks that the declared point count matches the number of points the file can
    /// actually hold, computed as `(file length - data offset) / point record length`.
    ///
    /// This is an explicit opt-in check, separate from decoding, so callers may choose
    /// to tolerate files with imprecise counts. It only applies to uncompressed files
    /// with a format version below 1.3: newer revisions no longer tie the end of the
    /// point data to the end of the file, and compressed files never did.
    pub fn validate<R: Seek>(&self, reader: &mut R) -> Result<()> {
        if self.version_minor >= 3 || self.compressed {
            return Ok(());
        }
        if self.point_record_length == 0 {
            return Err(
                PipelineError::MalformedHeader("point record length is zero".to_string()).into(),
            );
        }

        let previous_position = reader.seek(SeekFrom::Current(0))?;
        let file_length = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(previous_position))?;

        let point_bytes = file_length.saturating_sub(self.data_offset as u64);
        let computed = point_bytes / self.point_record_length as u64;
        let remainder = point_bytes % self.point_record_length as u64;

        if computed != self.point_count as u64 {
            return Err(PipelineError::PointCountMismatch {
                declared: self.point_count as u64,
                computed,
                remainder,
            }
            .into());
        }
        Ok(())
    }

    /// Builds the schema of required dimensions for this file's point format
    pub fn schema(&self) -> Result<Schema, PipelineError> {
        Schema::from_point_format(self.point_format)
    }

    pub fn file_source_id(&self) -> u16 {
        self.file_source_id
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub fn version_major(&self) -> u8 {
        self.version_major
    }

    pub fn version_minor(&self) -> u8 {
        self.version_minor
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn software_id(&self) -> &str {
        &self.software_id
    }

    pub fn creation_day_of_year(&self) -> u16 {
        self.creation_day_of_year
    }

    pub fn creation_year(&self) -> u16 {
        self.creation_year
    }

    pub fn header_size(&self) -> u16 {
        self.header_size
    }

    /// Returns the effective offset to the start of the point data, including the
    /// pad-signature fixup if one was applied
    pub fn data_offset(&self) -> u32 {
        self.data_offset
    }

    /// Returns the point data format id (the low 6 bits of the format byte)
    pub fn point_format(&self) -> u8 {
        self.point_format
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Returns the on-disk size in bytes of a single point record
    pub fn point_record_length(&self) -> u16 {
        self.point_record_length
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    pub fn points_by_return(&self) -> &[u32; 5] {
        &self.points_by_return
    }

    pub fn scale(&self) -> &Vector3<f64> {
        &self.scale
    }

    pub fn offset(&self) -> &Vector3<f64> {
        &self.offset
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn vlrs(&self) -> &[Vlr] {
        &self.vlrs
    }

    /// Returns true if this file's point records carry a GPS time field
    pub fn has_gps_time(&self) -> bool {
        format_has_gps_time(self.point_format)
    }

    /// Returns true if this file's point records carry RGB color fields
    pub fn has_colors(&self) -> bool {
        format_has_colors(self.point_format)
    }

    /// Returns true if this file's point records carry a waveform block
    pub fn has_waveform(&self) -> bool {
        format_has_waveform(self.point_format)
    }
}

/// Decodes the two compression selector bits (bit 7 and bit 6) of the format byte.
/// Returns whether the point data is compressed.
fn decode_compression_flags(format_byte: u8) -> Result<bool, PipelineError> {
    let bit_7 = (format_byte & 0x80) != 0;
    let bit_6 = (format_byte & 0x40) != 0;
    match (bit_7, bit_6) {
        (false, false) => Ok(false),
        (true, false) => Ok(true),
        (true, true) => Err(PipelineError::LegacyExperimentalCompression),
        (false, true) => Err(PipelineError::InvalidCompressionFlag),
    }
}

/// Probes for the 2-byte pad signature at the current stream position, leaving the
/// position where it was. Checks both byte orders because some writers were careless
/// with their swapping. A probe that runs off the end of the file (a file with just a
/// header and no points) simply reports the signature as absent.
fn has_pad_signature<R: Read + Seek>(reader: &mut R) -> Result<bool> {
    let position = reader.seek(SeekFrom::Current(0))?;

    let mut pad = [0u8; 2];
    match reader.read_exact(&mut pad) {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::UnexpectedEof => {
            reader.seek(SeekFrom::Start(position))?;
            return Ok(false);
        }
        Err(error) => return Err(error.into()),
    }
    reader.seek(SeekFrom::Start(position))?;

    Ok(pad == PAD_SIGNATURE || pad == [PAD_SIGNATURE[1], PAD_SIGNATURE[0]])
}

fn read_vlrs<R: Read>(reader: &mut R, count: u32) -> Result<Vec<Vlr>> {
    (0..count)
        .map(|index| {
            read_vlr(reader).with_context(|| format!("failed to read VLR {} of {}", index + 1, count))
        })
        .collect()
}

fn read_vlr<R: Read>(reader: &mut R) -> Result<Vlr> {
    let reserved = reader.read_u16::<LittleEndian>()?;
    let user_id = read_fixed_string(reader, 16)?;
    let record_id = reader.read_u16::<LittleEndian>()?;
    let record_length = reader.read_u16::<LittleEndian>()?;
    let description = read_fixed_string(reader, 32)?;

    let mut data = vec![0u8; record_length as usize];
    reader
        .read_exact(&mut data)
        .context("VLR payload is shorter than its declared record length")?;

    Ok(Vlr {
        reserved,
        user_id,
        record_id,
        description,
        data,
    })
}

/// Reads a null-padded text field of exactly `length` bytes and trims the padding
fn read_fixed_string<R: Read>(reader: &mut R, length: usize) -> Result<String> {
    let mut raw = vec![0u8; length];
    reader.read_exact(&mut raw)?;
    let end = raw
        .iter()
        .position(|&byte| byte == 0)
        .unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::las::test_util::TestLasFile;

    fn decode(bytes: Vec<u8>) -> Result<Header> {
        Header::read_from(&mut Cursor::new(bytes))
    }

    fn expect_pipeline_error(result: Result<Header>) -> PipelineError {
        let error = result.expect_err("decoding should have failed");
        error
            .downcast::<PipelineError>()
            .expect("expected a PipelineError")
    }

    #[test]
    fn test_decode_well_formed_header() -> Result<()> {
        let file = TestLasFile::new(1)
            .with_system_id("pointpipe test")
            .with_software_id("pointpipe")
            .with_points(crate::las::test_util::ramp_points(3));
        let bytes = file.build();
        let mut cursor = Cursor::new(bytes);
        let header = Header::read_from(&mut cursor)?;

        assert_eq!(1, header.version_major());
        assert_eq!(2, header.version_minor());
        assert_eq!("pointpipe test", header.system_id());
        assert_eq!("pointpipe", header.software_id());
        assert_eq!(LAS_HEADER_SIZE, header.header_size());
        assert_eq!(LAS_HEADER_SIZE as u32, header.data_offset());
        assert_eq!(1, header.point_format());
        assert!(!header.is_compressed());
        assert_eq!(28, header.point_record_length());
        assert_eq!(3, header.point_count());
        assert!(header.has_gps_time());
        assert!(!header.has_colors());
        assert!(header.vlrs().is_empty());

        // The stream is left at the effective data offset
        assert_eq!(
            header.data_offset() as u64,
            cursor.seek(SeekFrom::Current(0))?
        );
        Ok(())
    }

    #[test]
    fn test_decode_is_idempotent() -> Result<()> {
        let bytes = TestLasFile::new(0)
            .with_points(crate::las::test_util::ramp_points(5))
            .with_vlr(42, b"payload".to_vec())
            .build();
        let first = Header::read_from(&mut Cursor::new(bytes.clone()))?;
        let second = Header::read_from(&mut Cursor::new(bytes))?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_bad_signature_fails() {
        let mut bytes = TestLasFile::new(0).build();
        bytes[0..4].copy_from_slice(b"XASF");
        assert!(matches!(
            expect_pipeline_error(decode(bytes)),
            PipelineError::MalformedHeader(_)
        ));
    }

    #[test]
    fn test_header_size_below_fixed_block_fails() {
        let mut bytes = TestLasFile::new(0).build();
        // Header size field sits at byte offset 94
        bytes[94..96].copy_from_slice(&100u16.to_le_bytes());
        assert!(matches!(
            expect_pipeline_error(decode(bytes)),
            PipelineError::MalformedHeader(_)
        ));
    }

    #[test]
    fn test_data_offset_inside_header_fails() {
        let mut bytes = TestLasFile::new(0).build();
        // Offset-to-point-data field sits at byte offset 96
        bytes[96..100].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(
            expect_pipeline_error(decode(bytes)),
            PipelineError::InvalidDataOffset {
                data_offset: 100,
                header_size: LAS_HEADER_SIZE,
            }
        ));
    }

    #[test]
    fn test_compression_bit_truth_table() {
        // (1,1): the early experimental scheme
        let mut bytes = TestLasFile::new(0).build();
        bytes[104] = 0b1100_0000;
        assert!(matches!(
            expect_pipeline_error(decode(bytes)),
            PipelineError::LegacyExperimentalCompression
        ));

        // (0,1): impossible combination
        let mut bytes = TestLasFile::new(0).build();
        bytes[104] = 0b0100_0000;
        assert!(matches!(
            expect_pipeline_error(decode(bytes)),
            PipelineError::InvalidCompressionFlag
        ));

        // (1,0): compressed
        let bytes = TestLasFile::new(0).compressed().build();
        let header = decode(bytes).unwrap();
        assert!(header.is_compressed());
        assert_eq!(0, header.point_format());
    }

    #[test]
    fn test_invalid_point_format_fails() {
        let mut bytes = TestLasFile::new(0).build();
        bytes[104] = 6;
        assert!(matches!(
            expect_pipeline_error(decode(bytes)),
            PipelineError::InvalidPointFormat(6)
        ));
    }

    #[test]
    fn test_pad_signature_shifts_data_offset() -> Result<()> {
        let bytes = TestLasFile::new(0)
            .with_pad_signature()
            .with_points(crate::las::test_util::ramp_points(2))
            .build();
        let header = decode(bytes)?;
        assert_eq!(LAS_HEADER_SIZE as u32 + 2, header.data_offset());
        Ok(())
    }

    #[test]
    fn test_swapped_pad_signature_is_detected_too() -> Result<()> {
        let bytes = TestLasFile::new(0)
            .with_swapped_pad_signature()
            .with_points(crate::las::test_util::ramp_points(2))
            .build();
        let header = decode(bytes)?;
        assert_eq!(LAS_HEADER_SIZE as u32 + 2, header.data_offset());
        Ok(())
    }

    #[test]
    fn test_header_only_file_decodes() -> Result<()> {
        // No points at all: the pad probe runs off the end of the file and must
        // report the signature as absent instead of failing
        let header = decode(TestLasFile::new(0).build())?;
        assert_eq!(0, header.point_count());
        assert_eq!(LAS_HEADER_SIZE as u32, header.data_offset());
        Ok(())
    }

    #[test]
    fn test_scale_and_offset_are_decoded() -> Result<()> {
        let scale = Vector3::new(0.001, 0.001, 0.01);
        let offset = Vector3::new(500_000.0, 4_100_000.0, -25.0);
        let bytes = TestLasFile::new(0)
            .with_scale_and_offset(scale, offset)
            .with_points(crate::las::test_util::ramp_points(1))
            .build();
        let header = decode(bytes)?;
        assert_eq!(&scale, header.scale());
        assert_eq!(&offset, header.offset());
        Ok(())
    }

    #[test]
    fn test_vlrs_decode() -> Result<()> {
        let bytes = TestLasFile::new(0)
            .with_vlr(1001, vec![1, 2, 3, 4])
            .with_vlr(1002, Vec::new())
            .with_points(crate::las::test_util::ramp_points(1))
            .build();
        let header = decode(bytes)?;

        assert_eq!(2, header.vlrs().len());
        let first = &header.vlrs()[0];
        assert_eq!("pointpipe", first.user_id);
        assert_eq!(1001, first.record_id);
        assert_eq!(4, first.record_length());
        assert_eq!(vec![1, 2, 3, 4], first.data);
        assert_eq!(0, header.vlrs()[1].record_length());
        Ok(())
    }

    #[test]
    fn test_truncated_vlr_is_fatal() {
        let mut bytes = TestLasFile::new(0).with_vlr(1001, vec![0; 64]).build();
        // Cut into the VLR payload
        bytes.truncate(LAS_HEADER_SIZE as usize + 54 + 10);
        assert!(decode(bytes).is_err());
    }

    #[test]
    fn test_validate_detects_point_count_mismatch() -> Result<()> {
        let bytes = TestLasFile::new(0)
            .with_points(crate::las::test_util::ramp_points(4))
            .with_declared_point_count(9)
            .build();
        let mut cursor = Cursor::new(bytes);
        let header = Header::read_from(&mut cursor)?;

        let error = header
            .validate(&mut cursor)
            .expect_err("validation should have failed")
            .downcast::<PipelineError>()?;
        assert!(matches!(
            error,
            PipelineError::PointCountMismatch {
                declared: 9,
                computed: 4,
                remainder: 0,
            }
        ));
        Ok(())
    }

    #[test]
    fn test_validate_accepts_matching_point_count() -> Result<()> {
        let bytes = TestLasFile::new(1)
            .with_points(crate::las::test_util::ramp_points(4))
            .build();
        let mut cursor = Cursor::new(bytes);
        let header = Header::read_from(&mut cursor)?;
        header.validate(&mut cursor)
    }

    #[test]
    fn test_validate_skips_compressed_and_newer_files() -> Result<()> {
        // Compressed: the file-size arithmetic does not apply
        let bytes = TestLasFile::new(0)
            .compressed()
            .with_declared_point_count(1000)
            .build();
        let mut cursor = Cursor::new(bytes);
        let header = Header::read_from(&mut cursor)?;
        header.validate(&mut cursor)?;

        // Version 1.3 decoupled the point count from the file size
        let bytes = TestLasFile::new(0)
            .with_version_minor(3)
            .with_declared_point_count(1000)
            .build();
        let mut cursor = Cursor::new(bytes);
        let header = Header::read_from(&mut cursor)?;
        header.validate(&mut cursor)
    }
}
