//! photoroll 数据模型模块
//!
//! 包含所有数据结构定义

pub mod film_roll;
pub mod image;
pub mod settings;
pub mod tag;

// 重新导出常用类型
pub use film_roll::{FilmRoll, ORPHANED_IMAGE_NAME};
pub use image::{ImageRecord, INVALID_IMAGE_ID};
pub use settings::CatalogSettings;
pub use tag::{Tag, TagPair};

/// 当前时间（RFC 3339）
pub fn chrono_now() -> String {
    chrono::Utc::now().to_rfc3339()
}
