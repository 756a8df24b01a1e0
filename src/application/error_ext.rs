//! Attach the offending path to file system errors.

use std::io;
use std::path::Path;

use crate::application::{ApplicationError, ApplicationResult};

pub trait IoResultExt<T> {
    /// Turn an I/O failure into [`ApplicationError::Persistence`] naming
    /// `action` and `path`, e.g. `replace network file: /data/network.json`.
    fn with_path_context(self, action: &str, path: &Path) -> ApplicationResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path_context(self, action: &str, path: &Path) -> ApplicationResult<T> {
        self.map_err(|source| ApplicationError::Persistence {
            context: format!("{action}: {}", path.display()),
            source,
        })
    }
}
