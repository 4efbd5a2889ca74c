//! Binding error taxonomy

use std::path::PathBuf;

use thiserror::Error;

/// Error type for binding operations.
///
/// None of these are recovered from inside the binding: a failed load is
/// cached and handed back to every later caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    /// The shared library could not be located or opened
    #[error("library '{name}' not found: {reason}")]
    LibraryNotFound {
        name: String,
        reason: String,
        /// Directories searched before falling back to the OS loader
        searched: Vec<PathBuf>,
    },

    /// The library loaded but does not export a compatible symbol
    #[error("symbol '{symbol}' not found in '{library}': {reason}")]
    SymbolNotFound {
        symbol: String,
        library: String,
        reason: String,
    },

    /// The native function unwound instead of returning
    #[error("native call to '{symbol}' failed: {message}")]
    NativeCall { symbol: String, message: String },

    /// A binding for this library already exists in the process
    #[error("a binding for library '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl BindingError {
    /// Directories searched, for `LibraryNotFound`
    pub fn searched(&self) -> &[PathBuf] {
        match self {
            BindingError::LibraryNotFound { searched, .. } => searched,
            _ => &[],
        }
    }
}

/// Result type for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;
