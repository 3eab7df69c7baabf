//! photoroll 错误处理模块
//!
//! 定义核心库错误类型

use serde::Serialize;
use thiserror::Error;

/// 核心库错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 数据库错误（记录存储失败，当前操作中止）
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 图片 ID 或路径不存在
    #[error("未找到: {0}")]
    NotFound(String),

    /// 不支持的扩展名
    #[error("不支持的格式: {0}")]
    Unsupported(String),

    /// 元数据无法读取（非致命）
    #[error("元数据无法读取: {0}")]
    Unreadable(String),

    /// 复制源图片在复制前消失
    #[error("复制图片失败: 源图片 {0} 不存在")]
    DuplicationFailed(i64),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 通用错误
    #[error("{0}")]
    General(String),
}

impl AppError {
    /// 是否为可忽略的元数据读取失败
    pub fn is_unreadable(&self) -> bool {
        matches!(self, AppError::Unreadable(_))
    }
}

/// 面向前端的错误包装
#[derive(Debug, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl From<AppError> for CommandError {
    fn from(err: AppError) -> Self {
        let code = match &err {
            AppError::Database(_) => "E_DB_ERROR",
            AppError::Io(_) => "E_IO_ERROR",
            AppError::NotFound(_) => "E_NOT_FOUND",
            AppError::Unsupported(_) => "E_UNSUPPORTED_FORMAT",
            AppError::Unreadable(_) => "E_UNREADABLE",
            AppError::DuplicationFailed(_) => "E_DUPLICATION_FAILED",
            AppError::Config(_) => "E_CONFIG",
            AppError::General(_) => "E_GENERAL",
        };

        CommandError {
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

/// 核心库结果类型别名
pub type AppResult<T> = Result<T, AppError>;
