//! photoroll Core Library
//!
//! The catalog engine behind photoroll: image identity and versioning,
//! duplication and removal that keep tag co-occurrence counts exact, an
//! import pipeline with XMP sidecar discovery, and a locked in-memory cache
//! of per-image working state. It is frontend-agnostic; the command-line
//! frontend in the workspace root is one consumer.
//!
//! # Architecture
//!
//! - `models`: Data structures (ImageRecord, FilmRoll, Tag, CatalogSettings)
//! - `db`: SQLite record store with DAOs
//! - `services`: Catalog engine, importer, version resolver, record cache
//! - `events`: Event emission abstraction (EventSink trait)
//! - `paths`: Path provider abstraction (PathProvider trait)
//! - `utils`: Error handling and path helpers
//!
//! # Example
//!
//! ```no_run
//! use photoroll_core::{events::NoOpEventSink, paths::DefaultPathProvider, PhotorollCore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let core = PhotorollCore::new(
//!     Arc::new(DefaultPathProvider::new()),
//!     Arc::new(NoOpEventSink),
//! )
//! .unwrap();
//!
//! let summary = core.importer().import_directory(Path::new("/photos/2011"), false).unwrap();
//! for id in summary.image_ids {
//!     println!("{} v{}", id, core.database().version_of(id).unwrap());
//! }
//! core.teardown();
//! ```

pub mod db;
pub mod events;
pub mod models;
pub mod paths;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use db::{Database, DatabaseStats};
pub use events::{EventSink, LoggingEventSink, NoOpEventSink, SharedEventSink};
pub use models::{CatalogSettings, FilmRoll, ImageRecord, Tag, INVALID_IMAGE_ID};
pub use paths::{DefaultPathProvider, PathProvider, SharedPathProvider};
pub use services::{
    CapabilityRegistry, DetailLevel, ExifMetadataReader, ImageCache, ImageCatalog, ImageImporter,
    ImportOutcome, ImportSummary, MetadataReader, SettingsManager,
};
pub use utils::{AppError, AppResult, CommandError};

use std::sync::Arc;

/// photoroll core application context.
///
/// Owns the record store, the record cache and the services built on them.
/// Call [`teardown`](Self::teardown) before exit so dirty cached records
/// reach the store.
pub struct PhotorollCore {
    /// Database connection
    pub db: Arc<Database>,
    /// Path provider for resolving application paths
    pub path_provider: SharedPathProvider,
    /// Event sink for emitting events to the frontend
    pub event_sink: SharedEventSink,
    /// Validated catalog settings
    pub settings: CatalogSettings,
    cache: Arc<ImageCache>,
    catalog: Arc<ImageCatalog>,
    importer: ImageImporter,
}

impl PhotorollCore {
    /// Create a core with the default EXIF/XMP metadata reader.
    pub fn new(path_provider: SharedPathProvider, event_sink: SharedEventSink) -> AppResult<Self> {
        Self::with_reader(path_provider, event_sink, Arc::new(ExifMetadataReader))
    }

    /// Create a core with a custom metadata reader.
    pub fn with_reader(
        path_provider: SharedPathProvider,
        event_sink: SharedEventSink,
        reader: Arc<dyn MetadataReader>,
    ) -> AppResult<Self> {
        let settings = SettingsManager::new(path_provider.as_ref())?.load_validated()?;

        let db = Database::open_with_provider(path_provider.as_ref())?;
        db.init()?;
        let db = Arc::new(db);

        let cache = Arc::new(ImageCache::new(db.clone(), settings.cache_capacity));
        let catalog = Arc::new(ImageCatalog::new(
            db.clone(),
            cache.clone(),
            event_sink.clone(),
            Arc::new(CapabilityRegistry::new()),
            settings.show_folder_levels,
        ));
        let importer =
            ImageImporter::new(catalog.clone(), reader, event_sink.clone(), settings.clone());

        tracing::info!("catalog opened at {}", db.path().display());

        Ok(Self {
            db,
            path_provider,
            event_sink,
            settings,
            cache,
            catalog,
            importer,
        })
    }

    /// Get the database reference.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Get the path provider reference.
    pub fn paths(&self) -> &SharedPathProvider {
        &self.path_provider
    }

    /// Get the event sink reference.
    pub fn events(&self) -> &SharedEventSink {
        &self.event_sink
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    pub fn catalog(&self) -> &Arc<ImageCatalog> {
        &self.catalog
    }

    pub fn importer(&self) -> &ImageImporter {
        &self.importer
    }

    /// Flush dirty cached records and empty the cache.
    pub fn teardown(&self) -> usize {
        self.cache.teardown()
    }
}
