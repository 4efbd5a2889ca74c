//! Build script for native-binding test fixtures
//!
//! Compiles two small shared libraries with the host C compiler so the test
//! suite can exercise real `dlopen`/`dlsym` paths:
//!
//! - `sharedlibrary1` exports `int32_t add(int32_t, int32_t)` (wrapping)
//! - `noadd` exports only `sub`, for the missing-symbol path
//!
//! When no C compiler is available the fixtures are skipped and the
//! `native_fixtures` cfg is not set; the crate itself still builds.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const SHAREDLIBRARY1_SOURCE: &str = r#"
#include <stdint.h>

int32_t add(int32_t a, int32_t b) {
    return (int32_t)((uint32_t)a + (uint32_t)b);
}
"#;

const NOADD_SOURCE: &str = r#"
#include <stdint.h>

int32_t sub(int32_t a, int32_t b) {
    return (int32_t)((uint32_t)a - (uint32_t)b);
}
"#;

type DynError = Box<dyn std::error::Error + Send + Sync>;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rustc-check-cfg=cfg(native_fixtures)");

    let out_dir = match env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => return,
    };

    let family = env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default();
    if family != "unix" {
        println!("cargo:warning=native fixtures are only built for unix targets");
        return;
    }

    let fixtures = out_dir.join("fixtures");
    match build_fixtures(&fixtures) {
        Ok(()) => {
            println!("cargo:rustc-env=NATIVE_BINDING_FIXTURES={}", fixtures.display());
            println!("cargo:rustc-cfg=native_fixtures");
        }
        Err(err) => {
            println!("cargo:warning=skipping native fixtures: {err}");
        }
    }
}

fn build_fixtures(dir: &Path) -> Result<(), DynError> {
    fs::create_dir_all(dir)?;
    compile_shared(dir, "sharedlibrary1", SHAREDLIBRARY1_SOURCE)?;
    compile_shared(dir, "noadd", NOADD_SOURCE)?;
    Ok(())
}

/// Compile `source` into `dir/lib{name}.{so,dylib}`.
fn compile_shared(dir: &Path, name: &str, source: &str) -> Result<(), DynError> {
    let source_path = dir.join(format!("{name}.c"));
    fs::write(&source_path, source)?;

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let suffix = if target_os == "macos" { "dylib" } else { "so" };
    let output = dir.join(format!("lib{name}.{suffix}"));

    let compiler = cc::Build::new()
        .cargo_metadata(false)
        .try_get_compiler()?;

    let mut cmd = compiler.to_command();
    if target_os == "macos" {
        cmd.arg("-dynamiclib");
    } else {
        cmd.arg("-shared");
    }
    cmd.arg("-fPIC").arg("-O2").arg("-o").arg(&output).arg(&source_path);

    let status = cmd.status()?;
    if !status.success() {
        return Err(format!("compiling {} failed with {status}", source_path.display()).into());
    }
    Ok(())
}
