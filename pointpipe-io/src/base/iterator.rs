use anyhow::Result;
use pointpipe_core::containers::PointBuffer;

/// A stateful sequential traversal over the points of one stage. The iterator keeps a
/// position cursor that starts at point 0 and only ever moves forward.
///
/// Reads never run past the stage's declared point count: a read requested at the end
/// returns 0 without advancing. Conversely the declared count is a contract, so an
/// underlying source that runs dry earlier makes the read fail with
/// `UnexpectedEndOfStream` instead of silently returning a short stream.
pub trait SequentialIterator {
    /// Advances the cursor by up to `count` points, clamped to the stage's total
    /// point count. Returns the number of points actually skipped
    fn skip(&mut self, count: u64) -> Result<u64>;

    /// Fills up to `buffer.capacity()` points starting at the cursor, advances the
    /// cursor by the number of points read and returns that number. The buffer's
    /// valid count is reset by this call and reflects the points actually filled
    fn read(&mut self, buffer: &mut PointBuffer) -> Result<u64>;

    /// Returns true once the cursor has reached the stage's declared point count
    fn at_end(&self) -> bool;

    /// Returns the current cursor position
    fn index(&self) -> u64;
}

/// A random access traversal over the points of one stage. There is no persistent
/// forward-only cursor; instead [seek](RandomIterator::seek) places an internal
/// position marker anywhere and the following [read](RandomIterator::read) fills the
/// buffer from that marker.
pub trait RandomIterator {
    /// Moves the position marker to `position` and returns the position moved to.
    /// No clamping is applied beyond the limits of the underlying source
    fn seek(&mut self, position: u64) -> Result<u64>;

    /// Fills up to `buffer.capacity()` points starting at the position marker and
    /// advances the marker by the number of points read
    fn read(&mut self, buffer: &mut PointBuffer) -> Result<u64>;
}
