//! 标签数据模型

use serde::{Deserialize, Serialize};

/// 标签
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// 标签ID
    pub id: i64,
    /// 标签名（层级以 `|` 分隔，如 `photoroll|format|cr2`）
    pub name: String,
}

/// 标签共现计数（无序标签对，`tag_a < tag_b`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagPair {
    pub tag_a: i64,
    pub tag_b: i64,
}

impl TagPair {
    /// 规范化为 `tag_a < tag_b`
    pub fn new(x: i64, y: i64) -> Self {
        if x <= y {
            Self { tag_a: x, tag_b: y }
        } else {
            Self { tag_a: y, tag_b: x }
        }
    }
}

/// 文件格式标签名
pub fn format_tag_name(extension: &str) -> String {
    format!("photoroll|format|{}", extension.to_ascii_lowercase())
}
