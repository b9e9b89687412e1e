//! External collaborators consumed by the engine: whole-file reads and
//! writes, and a line-range provider for huge files.

mod error;
mod fs;
mod provider;

pub use error::{IoError, IoResult};
pub use fs::{BINARY_SNIFF_BYTES, FileSystem, LocalFs, looks_binary, read_text};
pub use provider::{LineProvider, LineRange, RopeLineProvider};
