mod header;
pub use self::header::*;

mod point_source;
pub use self::point_source::*;

mod reader;
pub use self::reader::*;

#[cfg(test)]
pub(crate) mod test_util;
