//! Dynamic Library Loader
//!
//! Safe wrapper around libloading for locating shared libraries on a search
//! path and resolving the typed `add` symbol.

use std::env;
use std::ffi::{CString, OsStr};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::debug;

use super::error::{BindingError, BindingResult};
use super::types::{AddFn, FfiSignature, ADD_SIGNATURE};

/// Extra library directories, in the platform's path-list syntax
pub const SEARCH_PATH_ENV: &str = "NATIVE_BINDING_PATH";

/// Ordered list of directories searched for a library file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// An empty search path; lookups fall straight through to the OS loader
    pub fn new() -> Self {
        Self::default()
    }

    /// The platform library path variable followed by `NATIVE_BINDING_PATH`
    pub fn from_env() -> Self {
        let mut search = Self::new();
        if let Some(value) = env::var_os(platform_path_var()) {
            search.extend_from_os(&value);
        }
        if let Some(value) = env::var_os(SEARCH_PATH_ENV) {
            search.extend_from_os(&value);
        }
        search
    }

    /// Append a directory
    pub fn push(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if !dir.as_os_str().is_empty() && !self.dirs.contains(&dir) {
            self.dirs.push(dir);
        }
    }

    /// Append every entry of an OS path list (`a:b:c`, `a;b;c` on Windows)
    pub fn extend_from_os(&mut self, list: &OsStr) {
        for dir in env::split_paths(list) {
            self.push(dir);
        }
    }

    /// Prepend directories so they win over the existing entries
    pub fn prepend(&mut self, dirs: impl IntoIterator<Item = PathBuf>) {
        let mut merged = Self::new();
        for dir in dirs {
            merged.push(dir);
        }
        for dir in self.dirs.drain(..) {
            merged.push(dir);
        }
        *self = merged;
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Candidate files for `name`, in search order
    pub fn candidates<'a>(&'a self, name: &str) -> impl Iterator<Item = PathBuf> + 'a {
        let file = library_filename(name);
        self.dirs.iter().map(move |dir| dir.join(&file))
    }
}

fn platform_path_var() -> &'static str {
    if cfg!(target_os = "windows") {
        "PATH"
    } else if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

/// Construct the platform-specific library filename.
///
/// Bare names always get the platform prefix and suffix, like a linker's
/// `-l` flag: `sharedlibrary1` becomes `libsharedlibrary1.so` on Linux, and
/// `libsharedlibrary1` becomes `liblibsharedlibrary1.so`.
///
/// Names already carrying a library suffix are file names: only the suffix is
/// switched to the current platform's, and the platform prefix is added when
/// missing (`libsharedlibrary1.so` is `libsharedlibrary1.dll` on Windows).
/// Versioned sonames such as `libc.so.6` are kept as-is.
pub fn library_filename(name: &str) -> String {
    use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};

    if name.contains(".so.") {
        return name.to_string();
    }

    let base = [".so", ".dylib", ".dll"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix));

    match base {
        Some(base) if base.starts_with(DLL_PREFIX) => format!("{}{}", base, DLL_SUFFIX),
        Some(base) => format!("{}{}{}", DLL_PREFIX, base, DLL_SUFFIX),
        None => format!("{}{}{}", DLL_PREFIX, name, DLL_SUFFIX),
    }
}

/// Names with a directory component are file paths, not library names
pub(super) fn is_explicit_path(name: &str) -> bool {
    let path = Path::new(name);
    path.is_absolute() || path.components().count() > 1
}

/// A dynamically loaded library
pub struct DynamicLibrary {
    /// Path (or bare filename when the OS loader did the search)
    path: PathBuf,
    /// The loaded library handle
    library: Library,
}

impl DynamicLibrary {
    /// Open the library at `path`
    pub fn open(name: &str, path: impl AsRef<Path>) -> BindingResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Safety: loading a library runs its initializers. We trust the
        // configured search path to contain only libraries meant for us.
        let library = unsafe {
            Library::new(&path).map_err(|e| BindingError::LibraryNotFound {
                name: name.to_string(),
                reason: format!("failed to load '{}': {}", path.display(), e),
                searched: Vec::new(),
            })?
        };

        Ok(Self { path, library })
    }

    /// Get the path to this library
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the library exports `symbol` at all
    pub fn has_symbol(&self, symbol: &str) -> bool {
        let Ok(c_name) = CString::new(symbol) else {
            return false;
        };
        // Safety: the symbol is only looked up, never called or dereferenced.
        unsafe {
            self.library
                .get::<*const ()>(c_name.as_bytes_with_nul())
                .is_ok()
        }
    }

    /// Resolve `add` as a typed function pointer
    pub fn resolve_add(&self) -> BindingResult<AddFn> {
        let symbol = ADD_SIGNATURE.name;
        let not_found = |reason: String| BindingError::SymbolNotFound {
            symbol: symbol.to_string(),
            library: self.path.display().to_string(),
            reason,
        };

        let c_name = CString::new(symbol).map_err(|e| not_found(e.to_string()))?;

        // Safety: the exported `add` is declared `int32_t add(int32_t, int32_t)`
        // with the C calling convention. The symbol table carries no type
        // information, so the declaration is the contract.
        let resolved: Symbol<Option<AddFn>> = unsafe {
            self.library
                .get(c_name.as_bytes_with_nul())
                .map_err(|e| not_found(e.to_string()))?
        };

        (*resolved).ok_or_else(|| not_found("symbol resolved to a null address".to_string()))
    }
}

impl fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A loaded library together with its resolved `add` entry point.
///
/// The function pointer is only valid while `library` stays open, so both
/// live and die together.
pub struct LibraryHandle {
    path: Option<PathBuf>,
    add: AddFn,
    _library: Option<DynamicLibrary>,
}

impl LibraryHandle {
    /// Resolve `add` in an opened library and take ownership of it
    pub fn from_library(library: DynamicLibrary) -> BindingResult<Self> {
        let add = library.resolve_add()?;
        Ok(Self {
            path: Some(library.path().to_path_buf()),
            add,
            _library: Some(library),
        })
    }

    /// Wrap an `add` already linked into the process
    pub fn from_fn(add: AddFn) -> Self {
        Self {
            path: None,
            add,
            _library: None,
        }
    }

    /// File the handle was loaded from; `None` for in-process functions
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Call the native `add`.
    ///
    /// The result is returned untouched. An unwind out of the native side
    /// becomes `NativeCall`.
    pub fn add(&self, a: i32, b: i32) -> BindingResult<i32> {
        let add = self.add;
        // Safety: `add` was resolved against ADD_SIGNATURE and the library
        // that owns it is held open by `self`.
        panic::catch_unwind(AssertUnwindSafe(|| unsafe { add(a, b) })).map_err(|payload| {
            BindingError::NativeCall {
                symbol: ADD_SIGNATURE.name.to_string(),
                message: panic_message(payload.as_ref()),
            }
        })
    }
}

impl fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "native function unwound".to_string()
    }
}

/// Produces the handle for a library name. Called at most once per binding.
pub trait SymbolLoader: Send + Sync {
    fn load(&self, name: &str) -> BindingResult<LibraryHandle>;
}

/// Loader that searches directories, then defers to the OS loader
#[derive(Debug, Clone)]
pub struct LibraryLoader {
    /// Search paths for libraries
    search_path: SearchPath,
    /// Declaration the library is expected to honour, checked after opening
    declaration: Option<FfiSignature>,
}

impl LibraryLoader {
    /// Create a loader over the environment's search path
    pub fn new() -> Self {
        Self::with_search_path(SearchPath::from_env())
    }

    pub fn with_search_path(search_path: SearchPath) -> Self {
        Self {
            search_path,
            declaration: None,
        }
    }

    /// Require the library's `add` to match `declaration`
    pub fn with_declaration(mut self, declaration: FfiSignature) -> Self {
        self.declaration = Some(declaration);
        self
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    /// Find a library file by name
    pub fn find_library(&self, name: &str) -> Option<PathBuf> {
        // If it's already a path, check if it exists
        if is_explicit_path(name) {
            let path = Path::new(name);
            return path.exists().then(|| path.to_path_buf());
        }

        self.search_path.candidates(name).find(|candidate| {
            let found = candidate.is_file();
            debug!(candidate = %candidate.display(), found, "probing library candidate");
            found
        })
    }

    /// Open a library by name.
    ///
    /// When none of the search directories holds the file, the platform
    /// filename is handed to the OS loader, which applies its own cache and
    /// default directories.
    pub fn open(&self, name: &str) -> BindingResult<DynamicLibrary> {
        let searched = self.search_path.dirs().to_vec();
        let with_searched = |err: BindingError| match err {
            BindingError::LibraryNotFound { name, reason, .. } => BindingError::LibraryNotFound {
                name,
                reason,
                searched: searched.clone(),
            },
            other => other,
        };

        if let Some(path) = self.find_library(name) {
            return DynamicLibrary::open(name, path).map_err(with_searched);
        }

        if is_explicit_path(name) {
            return Err(BindingError::LibraryNotFound {
                name: name.to_string(),
                reason: format!("no such file '{}'", name),
                searched: searched.clone(),
            });
        }

        let file = library_filename(name);
        debug!(file = %file, "deferring library lookup to the OS loader");
        DynamicLibrary::open(name, &file).map_err(with_searched)
    }

    /// Check the configured declaration against an opened library and
    /// resolve its `add`, taking ownership of the library.
    pub fn bind(&self, library: DynamicLibrary) -> BindingResult<LibraryHandle> {
        if let Some(declaration) = &self.declaration {
            if !declaration.matches(&ADD_SIGNATURE) {
                return Err(BindingError::SymbolNotFound {
                    symbol: ADD_SIGNATURE.name.to_string(),
                    library: library.path().display().to_string(),
                    reason: format!(
                        "declared as '{}', binding requires '{}'",
                        declaration, ADD_SIGNATURE
                    ),
                });
            }
        }

        LibraryHandle::from_library(library)
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolLoader for LibraryLoader {
    fn load(&self, name: &str) -> BindingResult<LibraryHandle> {
        self.bind(self.open(name)?)
    }
}

/// Loader for an `add` already linked into the process
pub struct InProcessLoader {
    add: AddFn,
}

impl InProcessLoader {
    pub fn new(add: AddFn) -> Self {
        Self { add }
    }
}

impl SymbolLoader for InProcessLoader {
    fn load(&self, _name: &str) -> BindingResult<LibraryHandle> {
        Ok(LibraryHandle::from_fn(self.add))
    }
}
