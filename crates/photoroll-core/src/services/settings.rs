//! 目录设置服务
//!
//! 负责 CatalogSettings 的读取、保存和校验

use crate::models::CatalogSettings;
use crate::paths::PathProvider;
use crate::utils::error::AppError;
use std::fs;
use std::path::PathBuf;

/// 设置管理器
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// 使用 PathProvider 创建设置管理器
    pub fn new(provider: &dyn PathProvider) -> Result<Self, AppError> {
        Self::from_path(provider.settings_path())
    }

    /// 从指定路径创建设置管理器
    pub fn from_path(settings_path: PathBuf) -> Result<Self, AppError> {
        if let Some(parent) = settings_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Config(format!("无法创建配置目录: {}", e)))?;
        }

        Ok(Self { settings_path })
    }

    /// 加载设置
    pub fn load(&self) -> Result<CatalogSettings, AppError> {
        if !self.settings_path.exists() {
            tracing::info!("设置文件不存在，使用默认设置");
            return Ok(CatalogSettings::default());
        }

        let content = fs::read_to_string(&self.settings_path)
            .map_err(|e| AppError::Config(format!("无法读取设置文件: {}", e)))?;

        let settings: CatalogSettings = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("设置文件格式错误: {}", e)))?;

        tracing::info!("成功加载设置: {:?}", self.settings_path);
        Ok(settings)
    }

    /// 加载并校验设置
    ///
    /// 初始评分越界时改回 1 并立即写回文件。
    pub fn load_validated(&self) -> Result<CatalogSettings, AppError> {
        let mut settings = self.load()?;
        if settings.sanitize_initial_rating() {
            tracing::warn!("初始评分越界，已重置为 {}", settings.initial_rating);
            self.save(&settings)?;
        }
        Ok(settings)
    }

    /// 保存设置
    pub fn save(&self, settings: &CatalogSettings) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| AppError::Config(format!("无法序列化设置: {}", e)))?;

        fs::write(&self.settings_path, content)
            .map_err(|e| AppError::Config(format!("无法保存设置文件: {}", e)))?;

        tracing::info!("成功保存设置: {:?}", self.settings_path);
        Ok(())
    }

    /// 重置为默认设置
    pub fn reset(&self) -> Result<CatalogSettings, AppError> {
        let default_settings = CatalogSettings::default();
        self.save(&default_settings)?;
        Ok(default_settings)
    }

    /// 获取设置文件路径
    pub fn path(&self) -> &PathBuf {
        &self.settings_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_manager_round_trip() {
        let tmp = TempDir::new().unwrap();
        let settings_path = tmp.path().join("config").join("settings.json");

        let manager = SettingsManager::from_path(settings_path).unwrap();

        // 文件不存在时返回默认设置
        let mut settings = manager.load().unwrap();
        assert_eq!(settings, CatalogSettings::default());

        settings.ignore_jpegs = true;
        settings.show_folder_levels = 3;
        manager.save(&settings).unwrap();
        assert_eq!(manager.load().unwrap(), settings);

        let reset = manager.reset().unwrap();
        assert_eq!(manager.load().unwrap(), reset);
        assert!(!reset.ignore_jpegs);
    }

    #[test]
    fn test_invalid_initial_rating_is_corrected_and_saved() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, r#"{"initialRating": 9}"#).unwrap();

        let manager = SettingsManager::from_path(path.clone()).unwrap();
        let settings = manager.load_validated().unwrap();
        assert_eq!(settings.initial_rating, 1);

        let on_disk: CatalogSettings =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.initial_rating, 1);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        let manager = SettingsManager::from_path(path).unwrap();
        assert!(matches!(manager.load(), Err(AppError::Config(_))));
    }
}
