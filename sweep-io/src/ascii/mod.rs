//! Delimited text files with one point per line

mod format;
pub(crate) use self::format::*;

mod reader;
pub use self::reader::*;

mod writer;
pub use self::writer::*;
