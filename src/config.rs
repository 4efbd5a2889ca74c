//! Binding Configuration
//!
//! Handles parsing and management of native-binding.toml configuration files.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ffi::{
    FfiSignature, LibraryLoader, SearchPath, ADD_SIGNATURE, DEFAULT_LIBRARY, LIBRARY_ENV,
};

/// File name searched for from the working directory upwards
pub const CONFIG_FILE: &str = "native-binding.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid declaration '{0}': expected a C declaration such as '{1}'")]
    InvalidDeclaration(String, String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching native-binding.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Library selection and lookup
    #[serde(default)]
    pub library: LibraryConfig,

    /// Directory of the file this was loaded from; relative search paths
    /// resolve against it.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl BindingConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: BindingConfig = toml::from_str(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                // Reached root without finding config
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `NATIVE_BINDING_LIBRARY` on top of the file's values.
    pub fn apply_env(&mut self) {
        self.apply_library_override(env::var(LIBRARY_ENV).ok());
    }

    /// Replace the library name when an override is present and non-empty.
    pub fn apply_library_override(&mut self, name: Option<String>) {
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            self.library.name = name;
        }
    }

    /// Configured search directories, absolute where the config file's
    /// location allows it.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        self.library
            .search_paths
            .iter()
            .map(|dir| match &self.base_dir {
                Some(base) if dir.is_relative() => base.join(dir),
                _ => dir.clone(),
            })
            .collect()
    }

    /// The parsed `declaration`, if one is configured.
    pub fn declaration(&self) -> ConfigResult<Option<FfiSignature>> {
        match &self.library.declaration {
            None => Ok(None),
            Some(text) => FfiSignature::parse(text).map(Some).ok_or_else(|| {
                ConfigError::InvalidDeclaration(text.clone(), "int add(int a, int b)".to_string())
            }),
        }
    }

    /// Loader with configured directories ahead of the environment's.
    pub fn loader(&self) -> ConfigResult<LibraryLoader> {
        let mut search = SearchPath::from_env();
        search.prepend(self.search_dirs());
        let loader = LibraryLoader::with_search_path(search);
        Ok(match self.declaration()? {
            Some(declaration) => loader.with_declaration(declaration),
            None => loader,
        })
    }
}

/// `[library]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Library name or path
    #[serde(default = "default_library_name")]
    pub name: String,

    /// Directories searched before the platform library path
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Expected C declaration of the bound symbol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<String>,
}

fn default_library_name() -> String {
    DEFAULT_LIBRARY.to_string()
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            name: default_library_name(),
            search_paths: Vec::new(),
            declaration: None,
        }
    }
}

impl LibraryConfig {
    /// The declaration the binding itself assumes, in C form
    pub fn expected_declaration() -> String {
        ADD_SIGNATURE.to_string()
    }
}
