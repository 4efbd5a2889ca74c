//! nb - command-line front end for native-binding
//!
//! Calls the bound `add` symbol and reports how the library was resolved.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use native_binding::config::BindingConfig;
use native_binding::ffi::{self, ADD_SIGNATURE};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nb")]
#[command(version)]
#[command(about = "Call into libsharedlibrary1 through a load-once binding", long_about = None)]
struct Cli {
    /// Config file (default: native-binding.toml in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call the native add(a, b) and print the result
    Add {
        #[arg(allow_negative_numbers = true)]
        a: i32,

        #[arg(allow_negative_numbers = true)]
        b: i32,

        #[command(flatten)]
        library: LibraryArgs,
    },

    /// Show where the library resolves and whether it exports add
    Resolve {
        #[command(flatten)]
        library: LibraryArgs,
    },

    /// Print the signature the binding expects
    Signature,
}

#[derive(Args)]
struct LibraryArgs {
    /// Library name or path (overrides config and NATIVE_BINDING_LIBRARY)
    #[arg(long)]
    library: Option<String>,

    /// Directory to search before the platform library path (repeatable)
    #[arg(long = "search-path", value_name = "DIR")]
    search_paths: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Add { a, b, library } => cmd_add(cli.config.as_ref(), &library, a, b),
        Commands::Resolve { library } => cmd_resolve(cli.config.as_ref(), &library),
        Commands::Signature => {
            println!("{}", ADD_SIGNATURE);
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file, then environment, then command-line flags
fn resolve_config(path: Option<&PathBuf>, args: &LibraryArgs) -> Result<BindingConfig> {
    let mut config = match path {
        Some(path) => BindingConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BindingConfig::load_from_cwd().context("Failed to load config")?,
    };
    config.apply_env();
    config.apply_library_override(args.library.clone());

    // Flags are relative to the working directory, not to the config file
    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let mut search_paths: Vec<PathBuf> = args.search_paths.iter().map(|dir| cwd.join(dir)).collect();
    search_paths.append(&mut config.library.search_paths);
    config.library.search_paths = search_paths;

    Ok(config)
}

fn cmd_add(config: Option<&PathBuf>, args: &LibraryArgs, a: i32, b: i32) -> Result<()> {
    let config = resolve_config(config, args)?;
    let loader = config.loader().context("Invalid library configuration")?;
    let name = config.library.name.as_str();

    let binding = ffi::install(name, loader).context("Failed to register binding")?;
    let sum = binding
        .add(a, b)
        .with_context(|| format!("add({a}, {b}) via '{name}' failed"))?;

    println!("{}", sum);
    Ok(())
}

fn cmd_resolve(config: Option<&PathBuf>, args: &LibraryArgs) -> Result<()> {
    let config = resolve_config(config, args)?;
    let loader = config.loader().context("Invalid library configuration")?;
    let name = config.library.name.as_str();

    println!("library:   {}", name);
    println!("file:      {}", ffi::library_filename(name));
    for dir in loader.search_path().dirs() {
        println!("search:    {}", dir.display());
    }
    match loader.find_library(name) {
        Some(path) => println!("found:     {}", path.display()),
        None => println!("found:     (deferred to the OS loader)"),
    }

    let library = loader
        .open(name)
        .with_context(|| format!("Failed to open '{}'", name))?;
    println!("opened:    {}", library.path().display());
    println!(
        "exports:   {} {}",
        ADD_SIGNATURE.name,
        if library.has_symbol(ADD_SIGNATURE.name) {
            "yes"
        } else {
            "no"
        }
    );

    // Declaration check and typed resolution on the library opened above
    loader
        .bind(library)
        .with_context(|| format!("'{}' cannot be bound", name))?;
    println!("binding:   {}", ADD_SIGNATURE);
    Ok(())
}
