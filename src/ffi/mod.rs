//! FFI Module
//!
//! Runtime binding to the `add` symbol exported by `libsharedlibrary1`.
//!
//! # Architecture
//!
//! ```text
//! registry::add(a, b) / registry::binding(name)
//!       │
//!       ▼
//! NativeLibraryBinding (init-once barrier, cached outcome)
//!       │
//!       ▼
//! SymbolLoader ── LibraryLoader (search path → libloading)
//!       │
//!       ▼
//! LibraryHandle::add → native `int32_t add(int32_t, int32_t)`
//! ```
//!
//! # Example
//!
//! ```no_run
//! use native_binding::ffi::{binding, BindingState};
//!
//! let lib = binding("sharedlibrary1");
//! assert_eq!(lib.state(), BindingState::Unloaded);
//! let sum = lib.add(2, 3)?;
//! assert_eq!(sum, 5);
//! # Ok::<(), native_binding::ffi::BindingError>(())
//! ```

mod binding;
mod error;
mod loader;
mod registry;
mod types;

pub use binding::{BindingState, NativeLibraryBinding};
pub use error::{BindingError, BindingResult};
pub use loader::{
    library_filename, DynamicLibrary, InProcessLoader, LibraryHandle, LibraryLoader, SearchPath,
    SymbolLoader, SEARCH_PATH_ENV,
};
pub use registry::{
    add, binding, default_binding, default_library_name, install, loaded_libraries,
    DEFAULT_LIBRARY, LIBRARY_ENV,
};
pub use types::{AddFn, FfiSignature, FfiType, NativeFunctionSignature, ADD_SIGNATURE};

#[cfg(test)]
mod tests;
