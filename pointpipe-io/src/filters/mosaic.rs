use std::sync::Arc;

use anyhow::{bail, Result};
use log::debug;

use pointpipe_core::containers::PointBuffer;
use pointpipe_core::layout::Schema;

use crate::base::{SequentialIterator, Stage};

/// Filter stage that concatenates the point streams of several child stages into one
/// logical stream, in child-list order, each child exhausted fully before the next
/// begins.
///
/// All children must share the same schema. The point count is the sum of the
/// children's counts. Sequential access only.
pub struct MosaicFilter {
    children: Vec<Box<dyn Stage>>,
    schema: Arc<Schema>,
    total: u64,
}

impl MosaicFilter {
    pub fn new(children: Vec<Box<dyn Stage>>) -> Result<Self> {
        let first = match children.first() {
            Some(child) => child,
            None => bail!("a mosaic needs at least one child stage"),
        };
        let schema = Arc::clone(first.schema());
        for child in &children[1..] {
            if **child.schema() != *schema {
                bail!(
                    "all children of a mosaic must share the same schema, but '{}' deviates",
                    child.name()
                );
            }
        }

        let total = children.iter().map(|child| child.point_count()).sum();
        debug!(
            "created filters.mosaic stage over {} child stage(s) with {} point(s) in total",
            children.len(),
            total
        );
        Ok(Self {
            children,
            schema,
            total,
        })
    }
}

impl Stage for MosaicFilter {
    fn name(&self) -> &'static str {
        "filters.mosaic"
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn point_count(&self) -> u64 {
        self.total
    }

    fn supports_sequential_iterator(&self) -> bool {
        true
    }

    fn create_sequential_iterator(&self) -> Result<Box<dyn SequentialIterator + '_>> {
        let iterators = self
            .children
            .iter()
            .map(|child| child.create_sequential_iterator())
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(MosaicIterator::new(
            iterators,
            Arc::clone(&self.schema),
        )))
    }
}

/// Sequential traversal over the concatenated streams of several child iterators.
///
/// Also constructible directly from child iterators, without a [MosaicFilter] stage,
/// for pipelines that assemble their readers by hand. The children must share the
/// schema and, like all sequential iterators, guarantee that a read returning 0
/// points means exhaustion.
pub struct MosaicIterator<'a> {
    children: Vec<Box<dyn SequentialIterator + 'a>>,
    schema: Arc<Schema>,
    current: usize,
    index: u64,
}

impl<'a> MosaicIterator<'a> {
    pub fn new(children: Vec<Box<dyn SequentialIterator + 'a>>, schema: Arc<Schema>) -> Self {
        Self {
            children,
            schema,
            current: 0,
            index: 0,
        }
    }
}

impl<'a> SequentialIterator for MosaicIterator<'a> {
    fn skip(&mut self, count: u64) -> Result<u64> {
        let mut remaining = count;
        while self.current < self.children.len() {
            if remaining > 0 {
                remaining -= self.children[self.current].skip(remaining)?;
            }
            // The skip either drained the current child or consumed the full count
            // within it; exhausted children are left behind either way
            if self.children[self.current].at_end() {
                self.current += 1;
            } else {
                break;
            }
        }
        let skipped = count - remaining;
        self.index += skipped;
        Ok(skipped)
    }

    fn read(&mut self, buffer: &mut PointBuffer) -> Result<u64> {
        let mut filled = 0usize;
        let mut scratch = PointBuffer::new(Arc::clone(&self.schema), buffer.capacity());
        while filled < buffer.capacity() && self.current < self.children.len() {
            // The scratch capacity caps the child read at the remaining space, so it
            // only shrinks after a partial fill; exhausted children reuse it as-is
            let space = buffer.capacity() - filled;
            if scratch.capacity() != space {
                scratch = PointBuffer::new(Arc::clone(&self.schema), space);
            }
            let read = self.children[self.current].read(&mut scratch)? as usize;
            if read == 0 {
                // 0 means this child is exhausted, move on to the next
                self.current += 1;
                continue;
            }
            for offset in 0..read {
                buffer.copy_point_from(filled + offset, &scratch, offset)?;
            }
            filled += read;
        }
        buffer.set_valid_count(filled)?;
        self.index += filled as u64;
        Ok(filled as u64)
    }

    fn at_end(&self) -> bool {
        self.children[self.current..]
            .iter()
            .all(|child| child.at_end())
    }

    fn index(&self) -> u64 {
        self.index
    }
}
