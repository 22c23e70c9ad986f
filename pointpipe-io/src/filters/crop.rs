use std::sync::Arc;

use anyhow::Result;
use log::debug;

use pointpipe_core::containers::PointBuffer;
use pointpipe_core::error::PipelineError;
use pointpipe_core::layout::{DimensionKind, Schema};
use pointpipe_core::math::Bounds;
use pointpipe_core::nalgebra::Point3;

use crate::base::{SequentialIterator, Stage};

/// How many points the crop iterator pulls from its upstream stage per refill
const CHUNK_POINTS: usize = 1024;

/// Filter stage that passes through only the points whose coordinates lie inside a
/// configured [Bounds] volume, preserving their relative order.
///
/// Supports sequential access only: which points pass is data-dependent, so there is
/// no stable index mapping a random access iterator could rely on. The declared point
/// count of this stage is the upstream count, which is an upper bound; the true
/// output count is only known once the stream has been fully consumed.
pub struct CropFilter {
    upstream: Box<dyn Stage>,
    bounds: Bounds,
    schema: Arc<Schema>,
}

/// Coordinate dimension indices, resolved once so the per-point predicate never
/// searches the schema. Points without a z dimension are cropped in 2D.
struct CoordinateIndices {
    x: usize,
    y: usize,
    z: Option<usize>,
}

impl CoordinateIndices {
    fn from_schema(schema: &Schema) -> Result<Self, PipelineError> {
        Ok(Self {
            x: schema.index_of(DimensionKind::X)?,
            y: schema.index_of(DimensionKind::Y)?,
            z: if schema.has_dimension(DimensionKind::Z) {
                schema.index_of(DimensionKind::Z).ok()
            } else {
                None
            },
        })
    }

    fn is_inside(
        &self,
        bounds: &Bounds,
        buffer: &PointBuffer,
        point_index: usize,
    ) -> Result<bool, PipelineError> {
        let x = buffer.get_field_as_f64(point_index, self.x)?;
        let y = buffer.get_field_as_f64(point_index, self.y)?;
        match self.z {
            Some(index_z) => {
                let z = buffer.get_field_as_f64(point_index, index_z)?;
                Ok(bounds.contains(&Point3::new(x, y, z)))
            }
            None => Ok(bounds.contains_xy(x, y)),
        }
    }
}

impl CropFilter {
    pub fn new(upstream: Box<dyn Stage>, bounds: Bounds) -> Self {
        let schema = Arc::clone(upstream.schema());
        debug!(
            "created filters.crop stage over '{}' with bounds {:?}",
            upstream.name(),
            bounds
        );
        Self {
            upstream,
            bounds,
            schema,
        }
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Appends the points of `source` that lie inside the bounds to `destination`,
    /// after its current valid count, stopping once `destination` is full. Returns
    /// how many points were accepted by this call. Holds no cross-call state: each
    /// call is a pure filter over the buffer given.
    pub fn process(&self, destination: &mut PointBuffer, source: &PointBuffer) -> Result<u64> {
        let indices = CoordinateIndices::from_schema(&self.schema)?;
        let mut write_slot = destination.valid_count();
        let mut accepted = 0u64;

        for point in 0..source.valid_count() {
            if write_slot == destination.capacity() {
                break;
            }
            if indices.is_inside(&self.bounds, source, point)? {
                destination.copy_point_from(write_slot, source, point)?;
                write_slot += 1;
                accepted += 1;
            }
        }

        destination.set_valid_count(write_slot)?;
        Ok(accepted)
    }
}

impl Stage for CropFilter {
    fn name(&self) -> &'static str {
        "filters.crop"
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn point_count(&self) -> u64 {
        // Upper bound; the filter cannot know its true output count in advance
        self.upstream.point_count()
    }

    fn supports_sequential_iterator(&self) -> bool {
        true
    }

    fn create_sequential_iterator(&self) -> Result<Box<dyn SequentialIterator + '_>> {
        let capacity = CHUNK_POINTS.min(self.upstream.point_count().max(1) as usize);
        Ok(Box::new(CropSequentialIterator {
            upstream: self.upstream.create_sequential_iterator()?,
            filter: self,
            scratch: PointBuffer::new(Arc::clone(&self.schema), capacity),
            pending: PointBuffer::new(Arc::clone(&self.schema), capacity),
            pending_cursor: 0,
            index: 0,
        }))
    }
}

/// Sequential traversal over the accepted points of a [CropFilter].
///
/// Keeps a buffer of points that were already accepted but not yet delivered, so that
/// a skip landing in the middle of an upstream chunk never drops accepted points and
/// skip/read compose exactly.
pub struct CropSequentialIterator<'a> {
    upstream: Box<dyn SequentialIterator + 'a>,
    filter: &'a CropFilter,
    scratch: PointBuffer,
    pending: PointBuffer,
    pending_cursor: usize,
    index: u64,
}

impl<'a> CropSequentialIterator<'a> {
    fn pending_len(&self) -> usize {
        self.pending.valid_count() - self.pending_cursor
    }

    /// Pulls upstream chunks through the filter until at least one accepted point is
    /// pending or the upstream stream is exhausted
    fn refill_pending(&mut self) -> Result<()> {
        self.pending.set_valid_count(0)?;
        self.pending_cursor = 0;

        while self.pending.valid_count() == 0 {
            let read = self.upstream.read(&mut self.scratch)?;
            if read == 0 {
                break;
            }
            self.filter.process(&mut self.pending, &self.scratch)?;
        }
        Ok(())
    }
}

impl<'a> SequentialIterator for CropSequentialIterator<'a> {
    fn skip(&mut self, count: u64) -> Result<u64> {
        let mut remaining = count;
        while remaining > 0 {
            if self.pending_len() == 0 {
                self.refill_pending()?;
                if self.pending_len() == 0 {
                    break;
                }
            }
            let advance = (remaining as usize).min(self.pending_len());
            self.pending_cursor += advance;
            remaining -= advance as u64;
        }
        let skipped = count - remaining;
        self.index += skipped;
        Ok(skipped)
    }

    fn read(&mut self, buffer: &mut PointBuffer) -> Result<u64> {
        let mut filled = 0usize;
        while filled < buffer.capacity() {
            if self.pending_len() == 0 {
                self.refill_pending()?;
                if self.pending_len() == 0 {
                    break;
                }
            }
            let take = (buffer.capacity() - filled).min(self.pending_len());
            for offset in 0..take {
                buffer.copy_point_from(filled + offset, &self.pending, self.pending_cursor + offset)?;
            }
            self.pending_cursor += take;
            filled += take;
        }
        buffer.set_valid_count(filled)?;
        self.index += filled as u64;
        Ok(filled as u64)
    }

    fn at_end(&self) -> bool {
        self.pending_len() == 0 && self.upstream.at_end()
    }

    fn index(&self) -> u64 {
        self.index
    }
}
