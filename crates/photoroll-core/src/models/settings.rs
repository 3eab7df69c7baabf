//! 目录设置数据模型

use serde::{Deserialize, Serialize};

/// 默认支持的扩展名
pub const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] = &[
    "3fr", "arw", "bay", "bmq", "cap", "cine", "cr2", "crw", "cs1", "dc2", "dcr", "dng", "erf",
    "fff", "hdr", "ia", "jpeg", "jpg", "k25", "kc2", "kdc", "mdc", "mef", "mos", "mrw", "nef",
    "nrw", "orf", "pef", "pfm", "png", "ppm", "pxn", "qtk", "raf", "raw", "rdc", "rw2", "rwl",
    "sr2", "srf", "sti", "tif", "tiff", "x3f",
];

/// 目录设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogSettings {
    /// 支持导入的扩展名（小写，不含点）
    pub supported_extensions: Vec<String>,
    /// 导入时忽略 JPEG
    pub ignore_jpegs: bool,
    /// 导入时的初始评分 (0-4)
    pub initial_rating: i32,
    /// 胶卷显示名使用的文件夹级数 (1-5)
    pub show_folder_levels: i32,
    /// 图片缓存中保留的空闲槽位数
    pub cache_capacity: usize,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            supported_extensions: DEFAULT_SUPPORTED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            ignore_jpegs: false,
            initial_rating: 1,
            show_folder_levels: 1,
            cache_capacity: 256,
        }
    }
}

impl CatalogSettings {
    /// 扩展名是否受支持（大小写不敏感）
    pub fn is_supported(&self, extension: &str) -> bool {
        self.supported_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// 校验初始评分；超出 0-4 时重置为 1，返回是否做了修正
    pub fn sanitize_initial_rating(&mut self) -> bool {
        if (0..=4).contains(&self.initial_rating) {
            false
        } else {
            self.initial_rating = 1;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = CatalogSettings::default();
        assert!(settings.is_supported("CR2"));
        assert!(settings.is_supported("jpg"));
        assert!(!settings.is_supported("xmp"));
        assert_eq!(settings.initial_rating, 1);
    }

    #[test]
    fn test_sanitize_initial_rating() {
        let mut settings = CatalogSettings {
            initial_rating: 7,
            ..CatalogSettings::default()
        };
        assert!(settings.sanitize_initial_rating());
        assert_eq!(settings.initial_rating, 1);
        assert!(!settings.sanitize_initial_rating());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: CatalogSettings = serde_json::from_str(r#"{"ignoreJpegs":true}"#).unwrap();
        assert!(settings.ignore_jpegs);
        assert_eq!(settings.show_folder_levels, 1);
        assert!(!settings.supported_extensions.is_empty());
    }
}
