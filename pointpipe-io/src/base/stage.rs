use std::sync::Arc;

use anyhow::Result;
use pointpipe_core::error::PipelineError;
use pointpipe_core::layout::Schema;

use super::{RandomIterator, SequentialIterator};

/// A node in an acyclic pipeline graph. Readers sit at the leaves and produce points
/// from some underlying source; filters own exactly one upstream stage (or an ordered
/// list, for mosaic-style composition) and transform its stream.
///
/// A stage computes its schema and output point count once at construction, from its
/// upstream stage or from the decoded file header. Its capability flags never change
/// afterwards: requesting an iterator kind the stage does not support fails with
/// `UnsupportedAccessMode`.
pub trait Stage {
    /// Returns the name of this stage kind, used in error messages and logs
    fn name(&self) -> &'static str;

    /// Returns the schema all points produced by this stage carry
    fn schema(&self) -> &Arc<Schema>;

    /// Returns the number of points this stage declares to produce. Iterators treat
    /// this as a contract, not a hint: a source that ends before the declared count
    /// is reached is an error
    fn point_count(&self) -> u64;

    /// Returns true if this stage supports sequential iteration
    fn supports_sequential_iterator(&self) -> bool {
        false
    }

    /// Returns true if this stage supports random access iteration
    fn supports_random_iterator(&self) -> bool {
        false
    }

    /// Begins a new sequential traversal over this stage's points. The returned
    /// iterator is bound to this stage for its whole lifetime
    fn create_sequential_iterator(&self) -> Result<Box<dyn SequentialIterator + '_>> {
        Err(PipelineError::UnsupportedAccessMode {
            stage: self.name(),
            mode: "sequential",
        }
        .into())
    }

    /// Begins a new random access traversal over this stage's points
    fn create_random_iterator(&self) -> Result<Box<dyn RandomIterator + '_>> {
        Err(PipelineError::UnsupportedAccessMode {
            stage: self.name(),
            mode: "random",
        }
        .into())
    }
}
