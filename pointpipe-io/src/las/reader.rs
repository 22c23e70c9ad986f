use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;

use pointpipe_core::containers::PointBuffer;
use pointpipe_core::error::PipelineError;
use pointpipe_core::layout::{DimensionKind, Schema};

use crate::base::{RandomIterator, ReadSeek, SequentialIterator, Stage};

use super::header::Header;
use super::point_source::{PointRecord, PointSource, RawPointSource};

/// Where the bytes of a LAS file come from. Every iterator opens its own stream from
/// this, so several concurrent traversals over one reader stage never share a stream
/// cursor.
#[derive(Debug, Clone)]
pub enum ByteSource {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

impl ByteSource {
    /// Opens a fresh byte stream positioned at the start
    pub fn open(&self) -> Result<Box<dyn ReadSeek>> {
        match self {
            ByteSource::Path(path) => {
                let file = File::open(path)
                    .with_context(|| format!("failed to open LAS file {}", path.display()))?;
                Ok(Box::new(BufReader::new(file)))
            }
            ByteSource::Memory(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
        }
    }
}

/// Reader stage for LAS files. Decodes the header once at construction and derives
/// its schema from the file's point format; point data is only touched by the
/// iterators created from this stage.
///
/// Supports both sequential and random traversal. Files with compressed point data or
/// waveform formats still decode their header fine, but creating an iterator for them
/// fails with `NotYetImplemented`.
pub struct LasReader {
    source: ByteSource,
    header: Header,
    schema: Arc<Schema>,
}

impl LasReader {
    /// Creates a reader stage for the LAS file at the given path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(ByteSource::Path(path.as_ref().to_owned()))
    }

    /// Creates a reader stage over an in-memory LAS file
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::new(ByteSource::Memory(bytes.into()))
    }

    fn new(source: ByteSource) -> Result<Self> {
        let mut stream = source.open()?;
        let header = Header::read_from(&mut stream)?;
        let schema = Arc::new(header.schema()?);
        debug!(
            "created readers.las stage with {} point(s) of format {}",
            header.point_count(),
            header.point_format()
        );
        Ok(Self {
            source,
            header,
            schema,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Checks the declared point count against the actual file size, see
    /// [Header::validate]
    pub fn validate(&self) -> Result<()> {
        let mut stream = self.source.open()?;
        self.header.validate(&mut stream)
    }

    fn open_point_source(&self) -> Result<RawPointSource<Box<dyn ReadSeek>>> {
        if self.header.is_compressed() {
            return Err(
                PipelineError::NotYetImplemented("decoding compressed point data").into(),
            );
        }
        let mut source = RawPointSource::new(
            self.source.open()?,
            self.header.data_offset() as u64,
            self.header.point_format(),
            self.header.point_record_length(),
        )?;
        source.seek_point(0)?;
        Ok(source)
    }
}

impl Stage for LasReader {
    fn name(&self) -> &'static str {
        "readers.las"
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn point_count(&self) -> u64 {
        self.header.point_count() as u64
    }

    fn supports_sequential_iterator(&self) -> bool {
        true
    }

    fn supports_random_iterator(&self) -> bool {
        true
    }

    fn create_sequential_iterator(&self) -> Result<Box<dyn SequentialIterator + '_>> {
        Ok(Box::new(LasSequentialIterator {
            source: self.open_point_source()?,
            indices: FieldIndices::from_schema(&self.schema)?,
            schema: Arc::clone(&self.schema),
            total: self.point_count(),
            index: 0,
        }))
    }

    fn create_random_iterator(&self) -> Result<Box<dyn RandomIterator + '_>> {
        Ok(Box::new(LasRandomIterator {
            source: self.open_point_source()?,
            indices: FieldIndices::from_schema(&self.schema)?,
            schema: Arc::clone(&self.schema),
            total: self.point_count(),
            position: 0,
        }))
    }
}

/// Dimension indices of all decoded record fields, resolved once per iterator so the
/// per-point write loop never searches the schema
struct FieldIndices {
    x: usize,
    y: usize,
    z: usize,
    intensity: usize,
    return_number: usize,
    number_of_returns: usize,
    scan_direction: usize,
    edge_of_flight_line: usize,
    classification: usize,
    scan_angle_rank: usize,
    user_data: usize,
    point_source_id: usize,
    gps_time: Option<usize>,
    red: Option<usize>,
    green: Option<usize>,
    blue: Option<usize>,
}

impl FieldIndices {
    fn from_schema(schema: &Schema) -> Result<Self, PipelineError> {
        let optional_index = |kind| {
            if schema.has_dimension(kind) {
                schema.index_of(kind).ok()
            } else {
                None
            }
        };
        Ok(Self {
            x: schema.index_of(DimensionKind::X)?,
            y: schema.index_of(DimensionKind::Y)?,
            z: schema.index_of(DimensionKind::Z)?,
            intensity: schema.index_of(DimensionKind::Intensity)?,
            return_number: schema.index_of(DimensionKind::ReturnNumber)?,
            number_of_returns: schema.index_of(DimensionKind::NumberOfReturns)?,
            scan_direction: schema.index_of(DimensionKind::ScanDirectionFlag)?,
            edge_of_flight_line: schema.index_of(DimensionKind::EdgeOfFlightLine)?,
            classification: schema.index_of(DimensionKind::Classification)?,
            scan_angle_rank: schema.index_of(DimensionKind::ScanAngleRank)?,
            user_data: schema.index_of(DimensionKind::UserData)?,
            point_source_id: schema.index_of(DimensionKind::PointSourceId)?,
            gps_time: optional_index(DimensionKind::GpsTime),
            red: optional_index(DimensionKind::Red),
            green: optional_index(DimensionKind::Green),
            blue: optional_index(DimensionKind::Blue),
        })
    }

    fn write_record(
        &self,
        buffer: &mut PointBuffer,
        slot: usize,
        record: &PointRecord,
    ) -> Result<(), PipelineError> {
        buffer.set_field(slot, self.x, record.x)?;
        buffer.set_field(slot, self.y, record.y)?;
        buffer.set_field(slot, self.z, record.z)?;
        buffer.set_field(slot, self.intensity, record.intensity)?;
        buffer.set_field(slot, self.return_number, record.return_number)?;
        buffer.set_field(slot, self.number_of_returns, record.number_of_returns)?;
        buffer.set_field(slot, self.scan_direction, record.scan_direction)?;
        buffer.set_field(slot, self.edge_of_flight_line, record.edge_of_flight_line)?;
        buffer.set_field(slot, self.classification, record.classification)?;
        buffer.set_field(slot, self.scan_angle_rank, record.scan_angle_rank)?;
        buffer.set_field(slot, self.user_data, record.user_data)?;
        buffer.set_field(slot, self.point_source_id, record.point_source_id)?;

        if let Some(index_gps) = self.gps_time {
            buffer.set_field(slot, index_gps, record.gps_time.unwrap_or_default())?;
        }
        if let (Some(index_red), Some(index_green), Some(index_blue)) =
            (self.red, self.green, self.blue)
        {
            let color = record.color.unwrap_or_default();
            buffer.set_field(slot, index_red, color.x)?;
            buffer.set_field(slot, index_green, color.y)?;
            buffer.set_field(slot, index_blue, color.z)?;
        }
        Ok(())
    }
}

/// Decodes `count` records from `source` into the front of `buffer` and sets the
/// buffer's valid count. The caller guarantees `count` fits the buffer's capacity; a
/// source that runs dry before `count` records is an `UnexpectedEndOfStream`.
fn fill_buffer(
    source: &mut dyn PointSource,
    indices: &FieldIndices,
    buffer: &mut PointBuffer,
    count: u64,
) -> Result<()> {
    for slot in 0..count as usize {
        let record = source
            .next_point()?
            .ok_or(PipelineError::UnexpectedEndOfStream)
            .with_context(|| {
                format!("point source ran dry after {} of {} point(s)", slot, count)
            })?;
        indices.write_record(buffer, slot, &record)?;
    }
    buffer.set_valid_count(count as usize)?;
    Ok(())
}

fn assert_matching_schema(stage_schema: &Schema, buffer: &PointBuffer) {
    if **buffer.schema() != *stage_schema {
        panic!("point buffer does not share the schema of the stage it is filled from!");
    }
}

pub struct LasSequentialIterator {
    source: RawPointSource<Box<dyn ReadSeek>>,
    indices: FieldIndices,
    schema: Arc<Schema>,
    total: u64,
    index: u64,
}

impl SequentialIterator for LasSequentialIterator {
    fn skip(&mut self, count: u64) -> Result<u64> {
        let advance = count.min(self.total - self.index);
        if advance > 0 {
            self.index += advance;
            // Skipping by seeking, one file seek instead of decoding and discarding
            self.source.seek_point(self.index)?;
        }
        Ok(advance)
    }

    fn read(&mut self, buffer: &mut PointBuffer) -> Result<u64> {
        assert_matching_schema(&self.schema, buffer);
        let count = (buffer.capacity() as u64).min(self.total - self.index);
        if count == 0 {
            buffer.set_valid_count(0)?;
            return Ok(0);
        }
        fill_buffer(&mut self.source, &self.indices, buffer, count)?;
        self.index += count;
        Ok(count)
    }

    fn at_end(&self) -> bool {
        self.index == self.total
    }

    fn index(&self) -> u64 {
        self.index
    }
}

pub struct LasRandomIterator {
    source: RawPointSource<Box<dyn ReadSeek>>,
    indices: FieldIndices,
    schema: Arc<Schema>,
    total: u64,
    position: u64,
}

impl RandomIterator for LasRandomIterator {
    fn seek(&mut self, position: u64) -> Result<u64> {
        self.source.seek_point(position)?;
        self.position = position;
        Ok(position)
    }

    fn read(&mut self, buffer: &mut PointBuffer) -> Result<u64> {
        assert_matching_schema(&self.schema, buffer);
        let count = (buffer.capacity() as u64).min(self.total.saturating_sub(self.position));
        if count == 0 {
            buffer.set_valid_count(0)?;
            return Ok(0);
        }
        fill_buffer(&mut self.source, &self.indices, buffer, count)?;
        self.position += count;
        Ok(count)
    }
}
