//! FFI Module Tests

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use super::*;

unsafe extern "C-unwind" fn wrapping_add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

unsafe extern "C-unwind" fn faulting_add(_a: i32, _b: i32) -> i32 {
    panic!("native fault")
}

/// Counts load attempts and sleeps inside the load to widen any race window
struct CountingLoader {
    attempts: Arc<AtomicUsize>,
    delay: Duration,
}

impl SymbolLoader for CountingLoader {
    fn load(&self, _name: &str) -> BindingResult<LibraryHandle> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(LibraryHandle::from_fn(wrapping_add))
    }
}

struct MissingLibraryLoader {
    attempts: Arc<AtomicUsize>,
}

impl SymbolLoader for MissingLibraryLoader {
    fn load(&self, name: &str) -> BindingResult<LibraryHandle> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BindingError::LibraryNotFound {
            name: name.to_string(),
            reason: "not on search path".to_string(),
            searched: vec![PathBuf::from("/nonexistent")],
        })
    }
}

fn counting_binding(name: &str) -> (NativeLibraryBinding, Arc<AtomicUsize>) {
    let attempts = Arc::new(AtomicUsize::new(0));
    let loader = CountingLoader {
        attempts: Arc::clone(&attempts),
        delay: Duration::from_millis(20),
    };
    (NativeLibraryBinding::with_loader(name, loader), attempts)
}

// ============================================================================
// Types
// ============================================================================

#[test]
fn test_ffi_type_parsing() {
    assert_eq!(FfiType::parse("int"), Some(FfiType::I32));
    assert_eq!(FfiType::parse("int32_t"), Some(FfiType::I32));
    assert_eq!(FfiType::parse("const int"), Some(FfiType::I32));
    assert_eq!(FfiType::parse("unsigned int"), Some(FfiType::U32));
    assert_eq!(FfiType::parse("u64"), Some(FfiType::U64));
    assert_eq!(FfiType::parse("void"), Some(FfiType::Void));
    assert_eq!(FfiType::parse("double"), None);
    assert_eq!(FfiType::parse("char*"), None);
}

#[test]
fn test_add_signature_display() {
    assert_eq!(ADD_SIGNATURE.to_string(), "i32 add(i32, i32)");
    assert_eq!(FfiSignature::from(ADD_SIGNATURE).to_string(), "i32 add(i32, i32)");
}

#[test]
fn test_signature_parsing() {
    let sig = FfiSignature::parse("int add(int a, int b)").unwrap();
    assert_eq!(sig.name, "add");
    assert_eq!(sig.return_type, FfiType::I32);
    assert_eq!(sig.params, vec![FfiType::I32, FfiType::I32]);
    assert!(sig.matches(&ADD_SIGNATURE));

    // Unnamed parameters and a trailing semicolon
    let sig = FfiSignature::parse("int32_t add(int32_t, int32_t);").unwrap();
    assert!(sig.matches(&ADD_SIGNATURE));

    let sig = FfiSignature::parse("u64 get_time(void)").unwrap();
    assert_eq!(sig.name, "get_time");
    assert!(sig.params.is_empty());

    assert!(FfiSignature::parse("add(int, int)").is_none());
    assert!(FfiSignature::parse("int add(int, int").is_none());
    assert!(FfiSignature::parse("int add(float, int)").is_none());
}

#[test]
fn test_signature_mismatch() {
    let wrong_return = FfiSignature::parse("long long add(int a, int b)").unwrap();
    assert!(!wrong_return.matches(&ADD_SIGNATURE));

    let wrong_arity = FfiSignature::parse("int add(int a)").unwrap();
    assert!(!wrong_arity.matches(&ADD_SIGNATURE));

    let wrong_name = FfiSignature::parse("int plus(int a, int b)").unwrap();
    assert!(!wrong_name.matches(&ADD_SIGNATURE));
}

// ============================================================================
// Library naming and search paths
// ============================================================================

#[cfg(target_os = "linux")]
#[test]
fn test_library_filename_linux() {
    assert_eq!(library_filename("sharedlibrary1"), "libsharedlibrary1.so");
    assert_eq!(library_filename("libsharedlibrary1.so"), "libsharedlibrary1.so");
    assert_eq!(library_filename("libsharedlibrary1.dylib"), "libsharedlibrary1.so");
    assert_eq!(library_filename("libc.so.6"), "libc.so.6");
    assert_eq!(library_filename("library2"), "liblibrary2.so");
    // Bare names always get the prefix, even when they already start with it
    assert_eq!(library_filename("libsharedlibrary1"), "liblibsharedlibrary1.so");
    assert_eq!(library_filename("sharedlibrary1.dll"), "libsharedlibrary1.so");
}

#[cfg(target_os = "windows")]
#[test]
fn test_library_filename_windows() {
    assert_eq!(library_filename("sharedlibrary1"), "sharedlibrary1.dll");
    assert_eq!(library_filename("libsharedlibrary1.so"), "libsharedlibrary1.dll");
    assert_eq!(library_filename("libsharedlibrary1.dll"), "libsharedlibrary1.dll");
}

#[test]
fn test_search_path_dedup_and_order() {
    let mut search = SearchPath::new();
    search.push("/opt/a");
    search.push("/opt/b");
    search.push("/opt/a");
    search.push("");
    assert_eq!(
        search.dirs(),
        &[PathBuf::from("/opt/a"), PathBuf::from("/opt/b")]
    );

    search.prepend(vec![PathBuf::from("/first"), PathBuf::from("/opt/b")]);
    assert_eq!(
        search.dirs(),
        &[
            PathBuf::from("/first"),
            PathBuf::from("/opt/b"),
            PathBuf::from("/opt/a")
        ]
    );
}

#[test]
fn test_search_path_candidates() {
    let mut search = SearchPath::new();
    search.push("/opt/a");
    search.push("/opt/b");
    let file = library_filename("sharedlibrary1");
    let candidates: Vec<PathBuf> = search.candidates("sharedlibrary1").collect();
    assert_eq!(
        candidates,
        vec![
            PathBuf::from("/opt/a").join(&file),
            PathBuf::from("/opt/b").join(&file)
        ]
    );
}

#[test]
fn test_search_path_from_os_list() {
    let list = std::env::join_paths(["/x", "/y"]).unwrap();
    let mut search = SearchPath::new();
    search.extend_from_os(&list);
    assert_eq!(search.dirs(), &[PathBuf::from("/x"), PathBuf::from("/y")]);
}

#[test]
fn test_find_library_in_search_path() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join(library_filename("fakelib"));
    std::fs::write(&file, b"not really a library").unwrap();

    let mut search = SearchPath::new();
    search.push("/definitely/not/here");
    search.push(dir.path());
    let loader = LibraryLoader::with_search_path(search);

    assert_eq!(loader.find_library("fakelib"), Some(file.clone()));
    assert_eq!(loader.find_library(file.to_str().unwrap()), Some(file));
    assert_eq!(loader.find_library("otherlib"), None);
}

#[test]
fn test_open_missing_library() {
    let dir = tempfile::tempdir().unwrap();
    let mut search = SearchPath::new();
    search.push(dir.path());
    let loader = LibraryLoader::with_search_path(search);

    let err = loader.load("nb_missing_library_3f9a").unwrap_err();
    match &err {
        BindingError::LibraryNotFound { name, .. } => assert_eq!(name, "nb_missing_library_3f9a"),
        other => panic!("expected LibraryNotFound, got {other:?}"),
    }
    assert_eq!(err.searched(), &[dir.path().to_path_buf()]);
}

#[test]
fn test_open_missing_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("libgone.so");
    let loader = LibraryLoader::with_search_path(SearchPath::new());

    let err = loader.open(path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, BindingError::LibraryNotFound { .. }));
}

#[test]
fn test_open_file_that_is_not_a_library() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join(library_filename("garbage"));
    std::fs::write(&file, b"garbage").unwrap();

    let mut search = SearchPath::new();
    search.push(dir.path());
    let loader = LibraryLoader::with_search_path(search);

    let err = loader.open("garbage").unwrap_err();
    match err {
        BindingError::LibraryNotFound { reason, searched, .. } => {
            assert!(reason.contains("failed to load"));
            assert_eq!(searched, vec![dir.path().to_path_buf()]);
        }
        other => panic!("expected LibraryNotFound, got {other:?}"),
    }
}

// ============================================================================
// Binding lifecycle
// ============================================================================

#[test]
fn test_binding_starts_unloaded() {
    let (binding, attempts) = counting_binding("lifecycle");
    assert_eq!(binding.state(), BindingState::Unloaded);
    assert_eq!(binding.load_count(), 0);
    assert_eq!(binding.library_name(), "lifecycle");
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
}

#[test]
fn test_binding_add_values() {
    let binding = NativeLibraryBinding::with_loader("inproc", InProcessLoader::new(wrapping_add));
    assert_eq!(binding.add(2, 3), Ok(5));
    assert_eq!(binding.add(-1, 1), Ok(0));
    assert_eq!(binding.add(i32::MIN, 0), Ok(i32::MIN));
    // In-process fixture wraps; a real library defines its own overflow behaviour
    assert_eq!(binding.add(i32::MAX, 1), Ok(i32::MIN));
    assert_eq!(binding.state(), BindingState::Loaded);
    assert_eq!(binding.library_path(), None);
}

#[test]
fn test_repeated_calls_load_once() {
    let (binding, attempts) = counting_binding("repeat");
    for i in 0..100 {
        assert_eq!(binding.add(i, i), Ok(i * 2));
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(binding.load_count(), 1);
    assert_eq!(binding.state(), BindingState::Loaded);
}

#[test]
fn test_concurrent_first_use_loads_once() {
    let (binding, attempts) = counting_binding("concurrent");
    let threads = 16;
    let barrier = Barrier::new(threads);

    thread::scope(|s| {
        for i in 0..threads as i32 {
            let binding = &binding;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                assert_eq!(binding.add(i, 1), Ok(i + 1));
            });
        }
    });

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(binding.load_count(), 1);
}

#[test]
fn test_failed_load_is_cached() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let binding = NativeLibraryBinding::with_loader(
        "absent",
        MissingLibraryLoader {
            attempts: Arc::clone(&attempts),
        },
    );

    let first = binding.add(1, 2).unwrap_err();
    let second = binding.load().unwrap_err();
    assert!(matches!(first, BindingError::LibraryNotFound { .. }));
    assert_eq!(first, second);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(binding.state(), BindingState::Failed);
    assert_eq!(binding.library_path(), None);
}

#[test]
fn test_native_unwind_becomes_native_call_error() {
    let binding = NativeLibraryBinding::with_loader("faulty", InProcessLoader::new(faulting_add));
    let err = binding.add(1, 2).unwrap_err();
    match err {
        BindingError::NativeCall { symbol, message } => {
            assert_eq!(symbol, "add");
            assert_eq!(message, "native fault");
        }
        other => panic!("expected NativeCall, got {other:?}"),
    }
    // The library itself stays loaded; only the call failed
    assert_eq!(binding.state(), BindingState::Loaded);
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_registry_one_binding_per_name() {
    let a = binding("nb_registry_identity");
    let b = binding("nb_registry_identity");
    assert!(std::ptr::eq(a, b));

    let c = binding("nb_registry_other");
    assert!(!std::ptr::eq(a, c));
}

#[cfg(target_os = "linux")]
#[test]
fn test_registry_normalizes_platform_names() {
    let bare = binding("nb_registry_normalized");
    let file = binding("libnb_registry_normalized.so");
    assert!(std::ptr::eq(bare, file));
}

#[test]
fn test_registry_install() {
    let installed = install("nb_registry_installed", InProcessLoader::new(wrapping_add)).unwrap();
    assert!(std::ptr::eq(installed, binding("nb_registry_installed")));
    assert_eq!(installed.add(40, 2), Ok(42));
    assert!(loaded_libraries().contains(&"nb_registry_installed".to_string()));

    let err = install("nb_registry_installed", InProcessLoader::new(wrapping_add)).unwrap_err();
    assert_eq!(
        err,
        BindingError::AlreadyRegistered("nb_registry_installed".to_string())
    );
}

#[test]
fn test_registry_missing_library_is_not_fatal_to_process() {
    let missing = binding("nb_registry_missing_7c21");
    let err = missing.add(2, 3).unwrap_err();
    assert!(matches!(err, BindingError::LibraryNotFound { .. }));
    assert!(!loaded_libraries().contains(&"nb_registry_missing_7c21".to_string()));
}

unsafe extern "C-unwind" fn wrapping_sub(a: i32, b: i32) -> i32 {
    a.wrapping_sub(b)
}

#[test]
fn test_default_binding_is_fixed_after_first_use() {
    let name = default_library_name();
    install(&name, InProcessLoader::new(wrapping_add)).unwrap();
    install("nb_default_elsewhere", InProcessLoader::new(wrapping_sub)).unwrap();

    assert_eq!(add(2, 3), Ok(5));
    assert!(std::ptr::eq(default_binding(), binding(&name)));

    std::env::set_var(LIBRARY_ENV, "nb_default_elsewhere");
    let after = add(2, 3);
    std::env::remove_var(LIBRARY_ENV);

    assert_eq!(after, Ok(5));
    assert!(std::ptr::eq(default_binding(), binding(&name)));
    assert_eq!(binding(&name).load_count(), 1);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_binding_error_display() {
    let err = BindingError::LibraryNotFound {
        name: "sharedlibrary1".to_string(),
        reason: "no such file".to_string(),
        searched: vec![],
    };
    assert_eq!(err.to_string(), "library 'sharedlibrary1' not found: no such file");

    let err = BindingError::SymbolNotFound {
        symbol: "add".to_string(),
        library: "/lib/libx.so".to_string(),
        reason: "undefined symbol".to_string(),
    };
    assert!(err.to_string().contains("'add'"));
    assert!(err.to_string().contains("/lib/libx.so"));

    let err = BindingError::NativeCall {
        symbol: "add".to_string(),
        message: "boom".to_string(),
    };
    assert_eq!(err.to_string(), "native call to 'add' failed: boom");
    assert!(err.searched().is_empty());
}
