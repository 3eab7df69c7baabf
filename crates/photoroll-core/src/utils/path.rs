//! 路径工具

use std::path::Path;

/// 文件名（不含目录）
pub fn basename(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// 小写扩展名（不含点）
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
}

/// 胶卷显示名：取文件夹路径的最后 `levels` 级
///
/// 层级数被限制在 1..=5 之间。路径级数不足时返回整个路径。
pub fn film_roll_display_name(folder: &str, levels: i32) -> &str {
    let levels = levels.clamp(1, 5) as usize;
    let folder = folder.trim_end_matches('/');

    let mut count = 0;
    for (idx, ch) in folder.char_indices().rev() {
        if ch == '/' {
            count += 1;
            if count >= levels {
                return &folder[idx + 1..];
            }
        }
    }
    folder
}
