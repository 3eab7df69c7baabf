//! Path provider abstraction.
//!
//! Resolves where the catalog keeps its database, settings and logs, so the
//! core never hard-codes a frontend's data directory convention.

use std::path::PathBuf;
use std::sync::Arc;

/// Trait for providing catalog data paths.
pub trait PathProvider: Send + Sync {
    /// Get the root application data directory.
    fn app_data_dir(&self) -> PathBuf;

    /// Get the database directory.
    fn database_dir(&self) -> PathBuf {
        self.app_data_dir().join("database")
    }

    /// Get the settings file path.
    fn settings_path(&self) -> PathBuf {
        self.app_data_dir().join("config").join("settings.json")
    }

    /// Get the logs directory.
    fn logs_dir(&self) -> PathBuf {
        self.app_data_dir().join("logs")
    }

    /// Get the catalog database file path.
    fn database_path(&self) -> PathBuf {
        self.database_dir().join("library.db")
    }
}

/// Shared reference to a PathProvider implementation.
pub type SharedPathProvider = Arc<dyn PathProvider>;

/// Default path provider rooted at `<data dir>/photoroll`.
#[derive(Debug, Clone)]
pub struct DefaultPathProvider {
    app_data_dir: PathBuf,
}

impl DefaultPathProvider {
    /// Create a provider under the platform data directory.
    pub fn new() -> Self {
        let app_data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photoroll");
        Self { app_data_dir }
    }

    /// Create a provider with a custom base directory.
    ///
    /// Useful for testing and for `--library` overrides.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            app_data_dir: base_dir,
        }
    }
}

impl Default for DefaultPathProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PathProvider for DefaultPathProvider {
    fn app_data_dir(&self) -> PathBuf {
        self.app_data_dir.clone()
    }
}
