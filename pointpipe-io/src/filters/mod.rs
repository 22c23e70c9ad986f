mod crop;
pub use self::crop::*;

mod mosaic;
pub use self::mosaic::*;
