use std::io::{Read, Seek};

mod stage;
pub use self::stage::*;

mod iterator;
pub use self::iterator::*;

/// Object-safe alias for byte streams that support both reading and seeking. Reader
/// stages hand these out so that every iterator owns its own stream cursor.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}
