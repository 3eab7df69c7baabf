//! 图片记录数据模型

use std::path::Path;

use serde::{Deserialize, Serialize};

/// 无效图片 ID（复制失败等场景的哨兵值）
pub const INVALID_IMAGE_ID: i64 = -1;

/// 评分位掩码 (0-5)
pub const FLAG_RATING_MASK: i32 = 0x7;
/// 已拒绝
pub const FLAG_REJECTED: i32 = 0x8;
/// 低动态范围图片
pub const FLAG_LDR: i32 = 0x20;
/// RAW 图片
pub const FLAG_RAW: i32 = 0x40;

/// 未设置的拍摄时间
pub const UNKNOWN_DATETIME: &str = "0000:00:00 00:00:00";

/// 图片记录（一个版本对应一条记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// 图片ID
    pub id: i64,
    /// 胶卷ID（可能指向已不存在的胶卷）
    pub film_id: i64,
    /// 文件名（同一照片的所有版本共享）
    pub filename: String,
    /// 原始宽度
    pub width: i32,
    /// 原始高度
    pub height: i32,
    /// 输出宽度
    pub output_width: i32,
    /// 输出高度
    pub output_height: i32,
    /// 方向（-1 表示未设置）
    pub orientation: i32,
    /// 标志位（评分、LDR 等）
    pub flags: i32,
    /// 裁切系数
    pub crop: f32,
    /// 曝光时间（秒）
    pub exposure: f32,
    /// 光圈
    pub aperture: f32,
    /// ISO
    pub iso: f32,
    /// 焦距 (mm)
    pub focal_length: f32,
    /// 对焦距离
    pub focus_distance: f32,
    /// 拍摄时间
    pub datetime_taken: String,
    /// 相机制造商
    pub maker: String,
    /// 相机型号
    pub model: String,
    /// 镜头
    pub lens: String,
    /// 标题
    pub caption: String,
    /// 描述
    pub description: String,
    /// 许可
    pub license: String,
    /// RAW 处理参数（不透明数据）
    pub raw_parameters: Vec<u8>,
    pub raw_denoise_threshold: f32,
    pub raw_auto_bright_threshold: f32,
    pub raw_black: i32,
    pub raw_maximum: i32,
}

impl Default for ImageRecord {
    fn default() -> Self {
        Self {
            id: INVALID_IMAGE_ID,
            film_id: INVALID_IMAGE_ID,
            filename: String::new(),
            width: 0,
            height: 0,
            output_width: 0,
            output_height: 0,
            orientation: -1,
            flags: 0,
            crop: 1.0,
            exposure: 0.0,
            aperture: 0.0,
            iso: 0.0,
            focal_length: 0.0,
            focus_distance: 0.0,
            datetime_taken: UNKNOWN_DATETIME.to_string(),
            maker: String::new(),
            model: String::new(),
            lens: String::new(),
            caption: String::new(),
            description: String::new(),
            license: String::new(),
            raw_parameters: Vec::new(),
            raw_denoise_threshold: 0.0,
            raw_auto_bright_threshold: 0.0,
            raw_black: 0,
            raw_maximum: 0,
        }
    }
}

impl ImageRecord {
    /// 创建新记录（导入时使用），初始评分来自设置
    pub fn new(id: i64, film_id: i64, filename: String, initial_rating: i32) -> Self {
        Self {
            id,
            film_id,
            filename,
            flags: initial_rating & FLAG_RATING_MASK,
            ..Self::default()
        }
    }

    /// 评分 (0-5)
    pub fn rating(&self) -> i32 {
        self.flags & FLAG_RATING_MASK
    }

    /// 设置评分（超出范围时截断到 0-5）
    pub fn set_rating(&mut self, rating: i32) {
        self.flags = (self.flags & !FLAG_RATING_MASK) | rating.clamp(0, 5);
    }

    /// 是否为低动态范围图片
    pub fn is_ldr(&self) -> bool {
        if self.flags & FLAG_LDR != 0 {
            return true;
        }
        Path::new(&self.filename)
            .extension()
            .map(|e| {
                let e = e.to_string_lossy();
                e.eq_ignore_ascii_case("jpg")
                    || e.eq_ignore_ascii_case("png")
                    || e.eq_ignore_ascii_case("ppm")
            })
            .unwrap_or(false)
    }

    /// 曝光参数摘要，例如 `1/250 f/2.8 50mm iso 100`
    pub fn exif_summary(&self) -> String {
        if self.exposure >= 0.1 {
            format!(
                "{:.1}'' f/{:.1} {}mm iso {}",
                self.exposure, self.aperture, self.focal_length as i32, self.iso as i32
            )
        } else {
            let denominator = if self.exposure > 0.0 { 1.0 / self.exposure } else { 0.0 };
            format!(
                "1/{:.0} f/{:.1} {}mm iso {}",
                denominator, self.aperture, self.focal_length as i32, self.iso as i32
            )
        }
    }
}
