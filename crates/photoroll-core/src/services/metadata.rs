//! 元数据读取服务
//!
//! 从图片文件读取内嵌 EXIF，从 XMP 附属文件读取编辑后的元数据，
//! 结果以 [`PartialRecord`] 的形式合并进 [`ImageRecord`]。

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use regex::Regex;

use crate::models::image::{FLAG_REJECTED, UNKNOWN_DATETIME};
use crate::models::ImageRecord;
use crate::utils::error::{AppError, AppResult};

/// 合并模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// 只要部分记录中有值就覆盖
    Overwrite,
    /// 只填充仍为默认值的字段
    FillMissing,
}

/// 部分记录：每个可合并字段都是可选的
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub orientation: Option<i32>,
    /// 评分；-1 表示已拒绝
    pub rating: Option<i32>,
    pub exposure: Option<f32>,
    pub aperture: Option<f32>,
    pub iso: Option<f32>,
    pub focal_length: Option<f32>,
    pub focus_distance: Option<f32>,
    /// `YYYY:MM:DD HH:MM:SS`
    pub datetime_taken: Option<String>,
    pub maker: Option<String>,
    pub model: Option<String>,
    pub lens: Option<String>,
    pub caption: Option<String>,
    pub description: Option<String>,
    pub license: Option<String>,
}

fn merge<T: PartialEq + Clone>(target: &mut T, value: &Option<T>, default: &T, mode: MergeMode) {
    if let Some(v) = value {
        if mode == MergeMode::Overwrite || target == default {
            *target = v.clone();
        }
    }
}

fn merge_text(target: &mut String, value: &Option<String>, mode: MergeMode) {
    merge(target, value, &String::new(), mode);
}

impl PartialRecord {
    /// 部分记录是否不含任何值
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// 按合并模式把部分记录写入记录
    pub fn apply(&self, record: &mut ImageRecord, mode: MergeMode) {
        merge(&mut record.width, &self.width, &0, mode);
        merge(&mut record.height, &self.height, &0, mode);
        merge(&mut record.orientation, &self.orientation, &-1, mode);
        merge(&mut record.exposure, &self.exposure, &0.0, mode);
        merge(&mut record.aperture, &self.aperture, &0.0, mode);
        merge(&mut record.iso, &self.iso, &0.0, mode);
        merge(&mut record.focal_length, &self.focal_length, &0.0, mode);
        merge(&mut record.focus_distance, &self.focus_distance, &0.0, mode);
        merge(
            &mut record.datetime_taken,
            &self.datetime_taken,
            &UNKNOWN_DATETIME.to_string(),
            mode,
        );
        merge_text(&mut record.maker, &self.maker, mode);
        merge_text(&mut record.model, &self.model, mode);
        merge_text(&mut record.lens, &self.lens, mode);
        merge_text(&mut record.caption, &self.caption, mode);
        merge_text(&mut record.description, &self.description, mode);
        merge_text(&mut record.license, &self.license, mode);

        if let Some(rating) = self.rating {
            if mode == MergeMode::Overwrite || record.rating() == 0 {
                if rating < 0 {
                    record.flags |= FLAG_REJECTED;
                } else {
                    record.flags &= !FLAG_REJECTED;
                    record.set_rating(rating);
                }
            }
        }
    }
}

/// 元数据读取器
///
/// 两个方法失败时都返回 [`AppError::Unreadable`]，调用方可以选择忽略。
pub trait MetadataReader: Send + Sync {
    /// 读取图片文件内嵌的元数据
    fn read_embedded(&self, path: &Path) -> AppResult<PartialRecord>;

    /// 读取 XMP 附属文件；文件不存在时返回空的部分记录
    fn read_sidecar(&self, path: &Path, mode: MergeMode) -> AppResult<PartialRecord>;
}

/// 基于 kamadak-exif 与 XMP 属性解析的默认读取器
#[derive(Debug, Clone, Default)]
pub struct ExifMetadataReader;

impl MetadataReader for ExifMetadataReader {
    fn read_embedded(&self, path: &Path) -> AppResult<PartialRecord> {
        let file = File::open(path)
            .map_err(|e| AppError::Unreadable(format!("{}: {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);
        let exif = Reader::new()
            .read_from_container(&mut reader)
            .map_err(|e| AppError::Unreadable(format!("{}: {}", path.display(), e)))?;
        Ok(Self::parse_exif(&exif))
    }

    fn read_sidecar(&self, path: &Path, mode: MergeMode) -> AppResult<PartialRecord> {
        if !path.is_file() {
            return Ok(PartialRecord::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Unreadable(format!("{}: {}", path.display(), e)))?;
        if !content.contains("x:xmpmeta") && !content.contains("rdf:RDF") {
            return Err(AppError::Unreadable(format!(
                "{}: 不是 XMP 文件",
                path.display()
            )));
        }
        tracing::debug!("读取附属文件 {:?} ({:?})", path, mode);
        Ok(Self::parse_xmp(&content))
    }
}

impl ExifMetadataReader {
    /// 从 EXIF 数据解析元数据
    fn parse_exif(exif: &exif::Exif) -> PartialRecord {
        let field = |tag: Tag| exif.get_field(tag, In::PRIMARY).map(|f| &f.value);
        let mut partial = PartialRecord::default();

        partial.width = field(Tag::PixelXDimension)
            .or_else(|| field(Tag::ImageWidth))
            .and_then(Self::get_int_value);
        partial.height = field(Tag::PixelYDimension)
            .or_else(|| field(Tag::ImageLength))
            .and_then(Self::get_int_value);
        partial.orientation = field(Tag::Orientation).and_then(Self::get_int_value);

        partial.exposure = field(Tag::ExposureTime).and_then(Self::get_rational_value);
        partial.aperture = field(Tag::FNumber).and_then(Self::get_rational_value);
        partial.focal_length = field(Tag::FocalLength).and_then(Self::get_rational_value);
        partial.focus_distance = field(Tag::SubjectDistance).and_then(Self::get_rational_value);
        partial.iso = field(Tag::PhotographicSensitivity)
            .and_then(Self::get_int_value)
            .map(|v| v as f32);

        partial.datetime_taken = field(Tag::DateTimeOriginal)
            .or_else(|| field(Tag::DateTime))
            .and_then(Self::get_ascii_value)
            .filter(|s| Self::is_exif_datetime(s));

        partial.maker = field(Tag::Make).and_then(Self::get_ascii_value);
        partial.model = field(Tag::Model).and_then(Self::get_ascii_value);
        partial.lens = field(Tag::LensModel).and_then(Self::get_ascii_value);
        partial.description = field(Tag::ImageDescription).and_then(Self::get_ascii_value);
        partial.license = field(Tag::Copyright).and_then(Self::get_ascii_value);

        partial
    }

    /// 获取整数值
    fn get_int_value(value: &Value) -> Option<i32> {
        value.get_uint(0).map(|v| v as i32)
    }

    /// 获取有理数值 (如焦距、光圈)
    fn get_rational_value(value: &Value) -> Option<f32> {
        match value {
            Value::Rational(v) if !v.is_empty() => {
                let r = &v[0];
                if r.denom != 0 {
                    Some(r.num as f32 / r.denom as f32)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// 获取 ASCII 值（去除空白，空串视为缺失）
    fn get_ascii_value(value: &Value) -> Option<String> {
        match value {
            Value::Ascii(v) if !v.is_empty() => {
                let s = String::from_utf8_lossy(&v[0]).trim().to_string();
                (!s.is_empty()).then_some(s)
            }
            _ => None,
        }
    }

    fn is_exif_datetime(s: &str) -> bool {
        NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S").is_ok()
    }

    /// 解析 XMP 内容
    fn parse_xmp(content: &str) -> PartialRecord {
        let mut partial = PartialRecord::default();

        partial.exposure = xmp_value(content, "exif:ExposureTime").and_then(|v| parse_fraction(&v));
        partial.aperture = xmp_value(content, "exif:FNumber").and_then(|v| parse_fraction(&v));
        partial.focal_length =
            xmp_value(content, "exif:FocalLength").and_then(|v| parse_fraction(&v));
        partial.focus_distance =
            xmp_value(content, "exif:SubjectDistance").and_then(|v| parse_fraction(&v));
        partial.iso = xmp_value(content, "exif:ISOSpeedRatings")
            .or_else(|| xmp_value(content, "exif:PhotographicSensitivity"))
            .and_then(|v| v.parse::<f32>().ok());

        partial.width = xmp_value(content, "exif:PixelXDimension")
            .or_else(|| xmp_value(content, "tiff:ImageWidth"))
            .and_then(|v| v.parse().ok());
        partial.height = xmp_value(content, "exif:PixelYDimension")
            .or_else(|| xmp_value(content, "tiff:ImageLength"))
            .and_then(|v| v.parse().ok());
        partial.orientation = xmp_value(content, "tiff:Orientation").and_then(|v| v.parse().ok());
        partial.rating = xmp_value(content, "xmp:Rating").and_then(|v| v.parse().ok());

        partial.datetime_taken = xmp_value(content, "exif:DateTimeOriginal")
            .or_else(|| xmp_value(content, "xmp:CreateDate"))
            .and_then(|v| parse_xmp_datetime(&v));

        partial.maker = xmp_value(content, "tiff:Make");
        partial.model = xmp_value(content, "tiff:Model");
        partial.lens = xmp_value(content, "aux:Lens")
            .or_else(|| xmp_value(content, "exifEX:LensModel"));
        partial.caption = xmp_value(content, "dc:title");
        partial.description = xmp_value(content, "dc:description");
        partial.license = xmp_value(content, "dc:rights");

        partial
    }
}

/// 读取 XMP 属性值
///
/// 依次尝试属性形式 `name="v"`、简单元素 `<name>v</name>`，
/// 以及容器元素中的第一个 `rdf:li`（`rdf:Alt`/`rdf:Seq`）。
fn xmp_value(content: &str, name: &str) -> Option<String> {
    let name = regex::escape(name);
    let patterns = [
        format!(r#"\b{}\s*=\s*"([^"]*)""#, name),
        format!(r"<{0}>([^<]*)</{0}>", name),
        format!(r"(?s)<{0}>\s*<rdf:(?:Alt|Seq|Bag)>\s*<rdf:li[^>]*>([^<]*)</rdf:li>", name),
    ];
    patterns.iter().find_map(|pattern| {
        let re = Regex::new(pattern).ok()?;
        let value = re.captures(content)?.get(1)?.as_str().trim();
        (!value.is_empty()).then(|| unescape_xml(value))
    })
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// 解析 `1/250`、`28/10` 或 `0.5`
fn parse_fraction(value: &str) -> Option<f32> {
    match value.split_once('/') {
        Some((num, den)) => {
            let num: f32 = num.trim().parse().ok()?;
            let den: f32 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => value.trim().parse().ok(),
    }
}

/// XMP 日期（ISO 8601，可带小数秒与时区）转换为 EXIF 格式
fn parse_xmp_datetime(value: &str) -> Option<String> {
    let head = value.get(..19)?;
    NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.format("%Y:%m:%d %H:%M:%S").to_string())
}
