//! 版本解析
//!
//! 版本号由记录在同组中的位置推导，不单独存储。版本 0 是不带后缀的
//! 原始文件名，版本 N 在最后一个 `.` 前插入 `_NN`。

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::db::Database;
use crate::utils::error::AppResult;

/// XMP 附属文件后缀
pub const SIDECAR_EXTENSION: &str = ".xmp";

/// 为路径追加版本后缀（纯函数）
///
/// `shoot/img001.CR2` 版本 1 得到 `shoot/img001_01.CR2`；
/// 文件名没有扩展名时后缀直接追加在末尾。
pub fn append_version_suffix(path: &Path, version: u32) -> PathBuf {
    if version == 0 {
        return path.to_path_buf();
    }
    let Some(name) = path.file_name() else {
        return path.to_path_buf();
    };

    let name = name.to_string_lossy();
    let versioned = match name.rfind('.') {
        Some(dot) => format!("{}_{:02}{}", &name[..dot], version, &name[dot..]),
        None => format!("{}_{:02}", name, version),
    };
    path.with_file_name(versioned)
}

/// 图片的版本化文件路径
pub fn versioned_filename(db: &Database, image_id: i64, base_path: &Path) -> AppResult<PathBuf> {
    let version = db.version_of(image_id)?;
    Ok(append_version_suffix(base_path, version))
}

/// 在路径末尾追加 `.xmp`
pub fn with_sidecar_extension(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_os_string();
    raw.push(SIDECAR_EXTENSION);
    PathBuf::from(raw)
}

/// 图片版本对应的 XMP 附属文件路径
pub fn sidecar_path(db: &Database, image_id: i64, base_path: &Path) -> AppResult<PathBuf> {
    Ok(with_sidecar_extension(&versioned_filename(db, image_id, base_path)?))
}
