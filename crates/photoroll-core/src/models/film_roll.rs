//! 胶卷（文件夹分组）数据模型

use serde::{Deserialize, Serialize};

/// 无对应胶卷时的显示名
pub const ORPHANED_IMAGE_NAME: &str = "orphaned image";

/// 胶卷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmRoll {
    /// 胶卷ID
    pub id: i64,
    /// 文件夹路径
    pub folder: String,
    /// 最近访问时间
    pub datetime_accessed: Option<String>,
}
