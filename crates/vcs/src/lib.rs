pub mod error;
pub mod git;
pub mod traits;

pub use error::{Result, VcsError};
pub use git::GitSource;
pub use traits::{SourceProvider, SourceSnapshot};
