//! Native Library Binding
//!
//! One binding per shared library. The library is opened on first use behind
//! a one-time initialization barrier and the outcome, success or failure, is
//! kept for the life of the binding.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::OnceCell;
use tracing::{info, warn};

use super::error::{BindingError, BindingResult};
use super::loader::{LibraryHandle, LibraryLoader, SymbolLoader};

/// Observable lifecycle of a binding.
///
/// Transitions are one-way: `Unloaded` moves to `Loaded` or `Failed` exactly
/// once and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unloaded,
    Loaded,
    Failed,
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingState::Unloaded => write!(f, "unloaded"),
            BindingState::Loaded => write!(f, "loaded"),
            BindingState::Failed => write!(f, "failed"),
        }
    }
}

/// Typed call surface over the `add` symbol of one shared library
pub struct NativeLibraryBinding {
    /// Library name as requested
    name: String,
    /// Resolves the handle on first use
    loader: Box<dyn SymbolLoader>,
    /// Set once; later callers observe the same outcome
    handle: OnceCell<BindingResult<LibraryHandle>>,
    /// Number of load attempts
    loads: AtomicUsize,
}

impl NativeLibraryBinding {
    /// Binding over the environment's library search path
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_loader(name, LibraryLoader::new())
    }

    /// Binding that resolves its handle through `loader`
    pub fn with_loader(name: impl Into<String>, loader: impl SymbolLoader + 'static) -> Self {
        Self {
            name: name.into(),
            loader: Box::new(loader),
            handle: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn library_name(&self) -> &str {
        &self.name
    }

    /// Load the library if that has not happened yet.
    ///
    /// Concurrent first callers block until the single load attempt finishes.
    /// A failed load is not retried: the same error is returned from then on.
    pub fn load(&self) -> BindingResult<&LibraryHandle> {
        self.handle
            .get_or_init(|| {
                self.loads.fetch_add(1, Ordering::SeqCst);
                let result = self.loader.load(&self.name);
                match &result {
                    Ok(handle) => info!(
                        library = %self.name,
                        path = ?handle.path(),
                        "loaded native library"
                    ),
                    Err(err) => warn!(library = %self.name, error = %err, "native library load failed"),
                }
                result
            })
            .as_ref()
            .map_err(BindingError::clone)
    }

    /// Call the native `add(a, b)`, loading the library first if needed
    pub fn add(&self, a: i32, b: i32) -> BindingResult<i32> {
        self.load()?.add(a, b)
    }

    pub fn state(&self) -> BindingState {
        match self.handle.get() {
            None => BindingState::Unloaded,
            Some(Ok(_)) => BindingState::Loaded,
            Some(Err(_)) => BindingState::Failed,
        }
    }

    /// How many times the loader has been invoked (0 or 1)
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// File the library was loaded from, once loaded
    pub fn library_path(&self) -> Option<&Path> {
        match self.handle.get() {
            Some(Ok(handle)) => handle.path(),
            _ => None,
        }
    }
}

impl fmt::Debug for NativeLibraryBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibraryBinding")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("loads", &self.load_count())
            .finish()
    }
}
