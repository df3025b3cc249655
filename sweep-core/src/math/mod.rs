mod bounds;
pub use self::bounds::*;

mod transform;
pub use self::transform::*;
