//! photoroll 服务模块
//!
//! 目录引擎、导入、版本解析、记录缓存等业务逻辑

pub mod cache;
pub mod capability;
pub mod catalog;
pub mod import;
pub mod metadata;
pub mod settings;
pub mod version;

// 重新导出常用类型
pub use cache::{DetailLevel, ImageCache, LevelHandle, SlotReadGuard, SlotWriteGuard};
pub use capability::{CapabilityRegistry, ParamIntrospect, ParamValue, RawImportParams, RAW_IMPORT};
pub use catalog::ImageCatalog;
pub use import::{ImageImporter, ImportOutcome, ImportSummary, SkipReason};
pub use metadata::{ExifMetadataReader, MergeMode, MetadataReader, PartialRecord};
pub use settings::SettingsManager;
pub use version::{append_version_suffix, sidecar_path, versioned_filename};
