//! native-binding - runtime binding to `libsharedlibrary1`
//!
//! Resolves the shared library `libsharedlibrary1.so` (or the platform
//! equivalent) on the library search path the first time it is needed, and
//! exposes its exported `int32_t add(int32_t, int32_t)` as a typed Rust call.
//!
//! # Features
//!
//! - **Load once**: each library is opened at most once per process, behind a
//!   one-time initialization barrier that is safe under concurrent first use
//! - **Typed symbol**: `add` is resolved to an `extern "C-unwind" fn(i32, i32) -> i32`
//!   at load time, with an optional declaration check from configuration
//! - **Explicit failures**: missing library, missing symbol and native unwinds
//!   surface as [`BindingError`] variants; a failed load is never retried
//!
//! # Example
//!
//! ```no_run
//! // Loads libsharedlibrary1 on first use
//! let sum = native_binding::add(2, 3)?;
//! assert_eq!(sum, 5);
//! # Ok::<(), native_binding::BindingError>(())
//! ```
//!
//! Bindings for other libraries, or with custom loaders, go through
//! [`ffi::binding`] and [`ffi::install`].

#![warn(clippy::all)]

pub mod config;
pub mod ffi;

// Re-export commonly used types
pub use config::{BindingConfig, ConfigError, ConfigResult};
pub use ffi::{
    add, binding, install, BindingError, BindingResult, BindingState, LibraryLoader,
    NativeLibraryBinding, ADD_SIGNATURE, DEFAULT_LIBRARY,
};
