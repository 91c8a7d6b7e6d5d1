pub mod error;
pub mod volume;

pub use error::{Result, ZfsError};
pub use volume::{ZfsManager, size_string};
