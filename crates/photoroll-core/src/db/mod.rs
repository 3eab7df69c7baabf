//! photoroll 数据库模块
//!
//! 包含数据库连接管理和数据访问层

pub mod connection;
pub mod film_roll_dao;
pub mod history_dao;
pub mod image_dao;
pub mod label_dao;
pub mod schema;
pub mod tag_dao;

// 重新导出常用类型
pub use connection::{Database, DatabaseStats};
pub use history_dao::HistoryItem;
pub use label_dao::ColorLabel;
