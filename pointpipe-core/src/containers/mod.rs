mod point_buffer;
pub use self::point_buffer::*;
