//! Process-wide binding registry
//!
//! All access to a library's binding goes through [`binding`], which hands
//! out one `'static` binding per distinct library. Bindings are never
//! released; process teardown reclaims the libraries.

use std::collections::HashMap;
use std::env;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::binding::{BindingState, NativeLibraryBinding};
use super::error::{BindingError, BindingResult};
use super::loader::{is_explicit_path, library_filename, SymbolLoader};

/// Library bound by the free [`add`] function
pub const DEFAULT_LIBRARY: &str = "sharedlibrary1";

/// Overrides [`DEFAULT_LIBRARY`] for the free [`add`] function
pub const LIBRARY_ENV: &str = "NATIVE_BINDING_LIBRARY";

/// Keyed by platform filename so `sharedlibrary1` and `libsharedlibrary1.so`
/// share a binding.
static BINDINGS: Lazy<Mutex<HashMap<String, &'static NativeLibraryBinding>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn registry_key(name: &str) -> String {
    if is_explicit_path(name) {
        name.to_string()
    } else {
        library_filename(name)
    }
}

/// The binding for `name`, created on first request
pub fn binding(name: &str) -> &'static NativeLibraryBinding {
    let mut bindings = BINDINGS.lock();
    *bindings
        .entry(registry_key(name))
        .or_insert_with(|| &*Box::leak(Box::new(NativeLibraryBinding::new(name))))
}

/// Register a binding for `name` that loads through `loader`.
///
/// Must happen before anything else asks for `name`; otherwise the existing
/// binding would silently be bypassed, so this fails with `AlreadyRegistered`.
pub fn install(
    name: &str,
    loader: impl SymbolLoader + 'static,
) -> BindingResult<&'static NativeLibraryBinding> {
    let mut bindings = BINDINGS.lock();
    let key = registry_key(name);
    if bindings.contains_key(&key) {
        return Err(BindingError::AlreadyRegistered(name.to_string()));
    }
    let binding: &'static NativeLibraryBinding =
        Box::leak(Box::new(NativeLibraryBinding::with_loader(name, loader)));
    bindings.insert(key, binding);
    Ok(binding)
}

/// Name of the library behind the free [`add`] function
pub fn default_library_name() -> String {
    env::var(LIBRARY_ENV)
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LIBRARY.to_string())
}

/// Resolved on first use of [`add`]; later changes to `NATIVE_BINDING_LIBRARY`
/// do not move the default to another library.
static DEFAULT_BINDING: Lazy<&'static NativeLibraryBinding> =
    Lazy::new(|| binding(&default_library_name()));

/// The binding behind the free [`add`] function
pub fn default_binding() -> &'static NativeLibraryBinding {
    *DEFAULT_BINDING
}

/// `add(a, b)` from the default library
pub fn add(a: i32, b: i32) -> BindingResult<i32> {
    DEFAULT_BINDING.add(a, b)
}

/// Names of bindings whose library is loaded
pub fn loaded_libraries() -> Vec<String> {
    let bindings = BINDINGS.lock();
    let mut names: Vec<String> = bindings
        .values()
        .filter(|binding| binding.state() == BindingState::Loaded)
        .map(|binding| binding.library_name().to_string())
        .collect();
    names.sort();
    names
}
