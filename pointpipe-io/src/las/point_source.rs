use std::io::{ErrorKind, Read, Seek, SeekFrom};

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};

use pointpipe_core::error::PipelineError;
use pointpipe_core::layout::{format_has_colors, format_has_gps_time, format_has_waveform};
use pointpipe_core::nalgebra::Vector3;

/// A single decoded point record, with the packed flag byte already split into its
/// four logical fields. Coordinates stay in their raw integer form; applying scale
/// and offset is left to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointRecord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub intensity: u16,
    pub return_number: u8,
    pub number_of_returns: u8,
    pub scan_direction: u8,
    pub edge_of_flight_line: u8,
    pub classification: u8,
    pub scan_angle_rank: i8,
    pub user_data: u8,
    pub point_source_id: u16,
    pub gps_time: Option<f64>,
    pub color: Option<Vector3<u16>>,
}

/// Something that yields decoded point records one at a time. This is the seam
/// between the iterator machinery and the actual point record codec, so adding a
/// decoder for compressed point data only means another implementation of this trait.
pub trait PointSource {
    /// Decodes the next point record. Returns `Ok(None)` when the underlying stream
    /// has no more complete records.
    fn next_point(&mut self) -> Result<Option<PointRecord>>;

    /// Positions the source so that the next call to `next_point` decodes the record
    /// with the given index
    fn seek_point(&mut self, index: u64) -> Result<()>;
}

/// Decoder for uncompressed point records of formats 0 through 5.
///
/// Formats 4 and 5 append a waveform block to the records of formats 1 and 3; the
/// shared leading fields decode fine but the waveform data itself has no decoder yet,
/// so constructing a source for those formats is refused up front.
pub struct RawPointSource<R: Read + Seek> {
    reader: R,
    data_offset: u64,
    point_format: u8,
    /// On-disk record size, which can exceed the format's base size when the file
    /// carries extra bytes per point
    record_length: u16,
    scratch: Vec<u8>,
}

impl<R: Read + Seek> RawPointSource<R> {
    pub fn new(reader: R, data_offset: u64, point_format: u8, record_length: u16) -> Result<Self> {
        if format_has_waveform(point_format) {
            return Err(PipelineError::NotYetImplemented(
                "decoding waveform point records (formats 4 and 5)",
            )
            .into());
        }
        let base_length = Self::base_record_length(point_format);
        if (record_length as usize) < base_length {
            return Err(PipelineError::MalformedHeader(format!(
                "point record length {} is smaller than the {} bytes required by format {}",
                record_length, base_length, point_format
            ))
            .into());
        }
        Ok(Self {
            reader,
            data_offset,
            point_format,
            record_length,
            scratch: vec![0u8; record_length as usize],
        })
    }

    fn base_record_length(point_format: u8) -> usize {
        let mut length = 20;
        if format_has_gps_time(point_format) {
            length += 8;
        }
        if format_has_colors(point_format) {
            length += 6;
        }
        length
    }
}

impl<R: Read + Seek> PointSource for RawPointSource<R> {
    fn next_point(&mut self) -> Result<Option<PointRecord>> {
        // Read a whole record at once so a truncated trailing record never leaves the
        // stream in the middle of a point
        match self.reader.read_exact(&mut self.scratch) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(error) => return Err(error).context("failed to read point record"),
        }

        let mut fields = &self.scratch[..];
        let x = fields.read_i32::<LittleEndian>()?;
        let y = fields.read_i32::<LittleEndian>()?;
        let z = fields.read_i32::<LittleEndian>()?;
        let intensity = fields.read_u16::<LittleEndian>()?;

        let flags = fields.read_u8()?;
        let return_number = flags & 0x07;
        let number_of_returns = (flags >> 3) & 0x07;
        let scan_direction = (flags >> 6) & 0x01;
        let edge_of_flight_line = (flags >> 7) & 0x01;

        let classification = fields.read_u8()?;
        let scan_angle_rank = fields.read_i8()?;
        let user_data = fields.read_u8()?;
        let point_source_id = fields.read_u16::<LittleEndian>()?;

        let gps_time = if format_has_gps_time(self.point_format) {
            Some(fields.read_f64::<LittleEndian>()?)
        } else {
            None
        };

        let color = if format_has_colors(self.point_format) {
            Some(Vector3::new(
                fields.read_u16::<LittleEndian>()?,
                fields.read_u16::<LittleEndian>()?,
                fields.read_u16::<LittleEndian>()?,
            ))
        } else {
            None
        };

        // Any remaining scratch bytes are per-point extra bytes, skipped implicitly
        // because the next read starts a fresh record

        Ok(Some(PointRecord {
            x,
            y,
            z,
            intensity,
            return_number,
            number_of_returns,
            scan_direction,
            edge_of_flight_line,
            classification,
            scan_angle_rank,
            user_data,
            point_source_id,
            gps_time,
            color,
        }))
    }

    fn seek_point(&mut self, index: u64) -> Result<()> {
        let byte_offset = self.data_offset + index * self.record_length as u64;
        self.reader.seek(SeekFrom::Start(byte_offset))?;
        Ok(())
    }
}
