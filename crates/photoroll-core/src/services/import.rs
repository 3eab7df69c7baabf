//! 导入服务
//!
//! 把磁盘上的图片注册为目录记录：创建版本 0 的记录，合并内嵌元数据与
//! 附属文件，添加格式标签，然后为每个带版本号的 XMP 附属文件复制出一个
//! 新版本。所有记录修改都在缓存槽位的写锁下进行。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::db::Database;
use crate::events::{EventSinkExt, ImageImportedPayload, SharedEventSink, IMAGE_IMPORTED};
use crate::models::image::{FLAG_LDR, FLAG_RAW};
use crate::models::tag::format_tag_name;
use crate::models::{CatalogSettings, ImageRecord};
use crate::services::cache::{ImageCache, SlotWriteGuard};
use crate::services::catalog::ImageCatalog;
use crate::services::metadata::{MergeMode, MetadataReader, PartialRecord};
use crate::services::version::{sidecar_path, SIDECAR_EXTENSION};
use crate::utils::error::{AppError, AppResult};
use crate::utils::path::{basename, lowercase_extension};

/// 从不作为图片导入的扩展名
const SIDECAR_EXTENSIONS: &[&str] = &["xmp", "dt", "dttags"];

/// 不属于 RAW 的高位深格式
const NON_RAW_EXTENSIONS: &[&str] = &["tif", "tiff", "hdr", "pfm"];

/// 跳过原因
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// 不是普通文件
    NotAFile,
    /// 附属文件（xmp/dt/dttags）
    Sidecar,
    /// 扩展名不受支持
    Unsupported(String),
    /// 设置了忽略 JPEG
    IgnoredJpeg,
}

/// 单个文件的导入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// 新建了记录
    Imported(i64),
    /// 记录已存在
    Existing(i64),
    /// 未导入
    Skipped(SkipReason),
}

impl ImportOutcome {
    /// 导入或已存在的图片 ID
    pub fn image_id(&self) -> Option<i64> {
        match self {
            ImportOutcome::Imported(id) | ImportOutcome::Existing(id) => Some(*id),
            ImportOutcome::Skipped(_) => None,
        }
    }
}

/// 目录导入结果
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub film_id: i64,
    /// 处理的文件数
    pub total: usize,
    pub imported: usize,
    pub existing: usize,
    pub skipped: usize,
    pub failed: usize,
    /// 导入或已存在的图片 ID（升序）
    pub image_ids: Vec<i64>,
    /// 失败文件及原因
    pub failed_files: Vec<String>,
}

/// 图片导入器
pub struct ImageImporter {
    db: Arc<Database>,
    cache: Arc<ImageCache>,
    catalog: Arc<ImageCatalog>,
    reader: Arc<dyn MetadataReader>,
    events: SharedEventSink,
    settings: CatalogSettings,
}

impl ImageImporter {
    pub fn new(
        catalog: Arc<ImageCatalog>,
        reader: Arc<dyn MetadataReader>,
        events: SharedEventSink,
        settings: CatalogSettings,
    ) -> Self {
        Self {
            db: catalog.database().clone(),
            cache: catalog.cache().clone(),
            catalog,
            reader,
            events,
            settings,
        }
    }

    /// 导入单个文件到指定胶卷
    pub fn import(
        &self,
        film_id: i64,
        path: &Path,
        override_ignore_jpeg: bool,
    ) -> AppResult<ImportOutcome> {
        let extension = match self.check_importable(path, override_ignore_jpeg) {
            Ok(extension) => extension,
            Err(reason) => {
                tracing::debug!("跳过 {}: {:?}", path.display(), reason);
                return Ok(ImportOutcome::Skipped(reason));
            }
        };
        let filename = basename(path)
            .ok_or_else(|| AppError::General(format!("无效的文件路径: {}", path.display())))?;

        // 查找与占位插入是同一个事务，并发导入同一文件只有一方新建记录
        let (id, inserted) = self.db.claim_image(film_id, &filename)?;
        if !inserted {
            // 已导入：确认记录可以加载即可
            drop(self.cache.read(id)?);
            return Ok(ImportOutcome::Existing(id));
        }
        tracing::debug!("导入 {} -> {}", path.display(), id);

        let mut guard = self.cache.write_uninit(id)?;
        {
            let record = guard.record_mut();
            *record = ImageRecord::new(id, film_id, filename.clone(), self.settings.initial_rating);
            record.flags |= format_flags(&extension, record);
        }
        match self.reader.read_embedded(path) {
            Ok(partial) => partial.apply(guard.record_mut(), MergeMode::Overwrite),
            Err(e) if e.is_unreadable() => {
                tracing::warn!("无法读取内嵌元数据 {}: {}", path.display(), e)
            }
            Err(e) => return Err(e),
        }
        let sidecar = sidecar_path(&self.db, id, path)?;
        self.merge_sidecar(&mut guard, &sidecar)?;

        self.catalog.attach_tag(id, &format_tag_name(&extension))?;
        guard.release()?;

        let mut version_ids = Vec::new();
        for sidecar in discover_sidecars(path) {
            let new_id = self.catalog.duplicate(id)?;
            let mut guard = self.cache.write(new_id)?;
            self.merge_sidecar(&mut guard, &sidecar)?;
            guard.release()?;
            tracing::debug!("附属文件 {} -> 版本 {}", sidecar.display(), new_id);
            version_ids.push(new_id);
        }

        self.events.emit_typed(
            IMAGE_IMPORTED,
            &ImageImportedPayload {
                image_id: id,
                film_id,
                filename,
                version_ids,
            },
        );
        Ok(ImportOutcome::Imported(id))
    }

    /// 检查文件是否可以导入，返回小写扩展名
    fn check_importable(&self, path: &Path, override_ignore_jpeg: bool) -> Result<String, SkipReason> {
        if !path.is_file() {
            return Err(SkipReason::NotAFile);
        }
        let extension = lowercase_extension(path).unwrap_or_default();
        if SIDECAR_EXTENSIONS.contains(&extension.as_str()) {
            return Err(SkipReason::Sidecar);
        }
        if extension.is_empty() || !self.settings.is_supported(&extension) {
            return Err(SkipReason::Unsupported(extension));
        }
        if !override_ignore_jpeg
            && self.settings.ignore_jpegs
            && (extension == "jpg" || extension == "jpeg")
        {
            return Err(SkipReason::IgnoredJpeg);
        }
        Ok(extension)
    }

    /// 用附属文件覆盖记录；无法读取时只记录警告
    fn merge_sidecar(&self, guard: &mut SlotWriteGuard, sidecar: &Path) -> AppResult<()> {
        let partial: PartialRecord = match self.reader.read_sidecar(sidecar, MergeMode::Overwrite) {
            Ok(partial) => partial,
            Err(e) if e.is_unreadable() => {
                tracing::warn!("无法读取附属文件 {}: {}", sidecar.display(), e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        partial.apply(guard.record_mut(), MergeMode::Overwrite);
        Ok(())
    }

    /// 导入文件夹中的所有文件（不递归）
    pub fn import_directory(&self, folder: &Path, override_ignore_jpeg: bool) -> AppResult<ImportSummary> {
        if !folder.is_dir() {
            return Err(AppError::NotFound(format!("目录不存在: {}", folder.display())));
        }

        let folder_key = folder.to_string_lossy();
        let film_id = self.db.get_or_create_film_roll(folder_key.trim_end_matches('/'))?;
        self.db.touch_film_roll(film_id)?;

        let files: Vec<PathBuf> = WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("扫描错误: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        tracing::info!("开始导入 {}，共 {} 个文件", folder.display(), files.len());

        let imported = AtomicUsize::new(0);
        let existing = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let failed_files = Mutex::new(Vec::new());

        let mut image_ids: Vec<i64> = files
            .par_iter()
            .filter_map(|path| match self.import(film_id, path, override_ignore_jpeg) {
                Ok(ImportOutcome::Imported(id)) => {
                    imported.fetch_add(1, Ordering::SeqCst);
                    Some(id)
                }
                Ok(ImportOutcome::Existing(id)) => {
                    existing.fetch_add(1, Ordering::SeqCst);
                    Some(id)
                }
                Ok(ImportOutcome::Skipped(_)) => {
                    skipped.fetch_add(1, Ordering::SeqCst);
                    None
                }
                Err(e) => {
                    tracing::warn!("导入文件失败 {}: {}", path.display(), e);
                    failed_files.lock().push(format!("{}: {}", path.display(), e));
                    None
                }
            })
            .collect();
        image_ids.sort_unstable();

        let failed_files = failed_files.into_inner();
        let summary = ImportSummary {
            film_id,
            total: files.len(),
            imported: imported.load(Ordering::SeqCst),
            existing: existing.load(Ordering::SeqCst),
            skipped: skipped.load(Ordering::SeqCst),
            failed: failed_files.len(),
            image_ids,
            failed_files,
        };
        tracing::info!(
            "导入完成: 新增 {}，已存在 {}，跳过 {}，失败 {}",
            summary.imported,
            summary.existing,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }
}

/// 按扩展名推导格式标志位
fn format_flags(extension: &str, record: &ImageRecord) -> i32 {
    if record.is_ldr() || extension == "jpeg" {
        FLAG_LDR
    } else if NON_RAW_EXTENSIONS.contains(&extension) {
        0
    } else {
        FLAG_RAW
    }
}

/// 查找同文件夹下带版本号的附属文件：`<stem>_*<.ext>.xmp`，按文件名排序
fn discover_sidecars(path: &Path) -> Vec<PathBuf> {
    let (Some(dir), Some(name)) = (path.parent(), basename(path)) else {
        return Vec::new();
    };
    let (stem, dot_ext) = match name.rfind('.') {
        Some(dot) => (&name[..dot], &name[dot..]),
        None => (name.as_str(), ""),
    };
    let prefix = format!("{}_", stem);
    let suffix = format!("{}{}", dot_ext, SIDECAR_EXTENSION);
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let candidate = entry.file_name().to_string_lossy();
            candidate.len() >= prefix.len() + suffix.len()
                && candidate.starts_with(&prefix)
                && candidate.ends_with(&suffix)
        })
        .map(|entry| entry.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingEventSink;
    use crate::events::{EventSink, IMAGE_DUPLICATED};
    use crate::services::capability::CapabilityRegistry;
    use crate::services::metadata::testing::FakeMetadataReader;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        shoot: PathBuf,
        db: Arc<Database>,
        sink: Arc<RecordingEventSink>,
        film_id: i64,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let shoot = tmp.path().join("shoot");
        std::fs::create_dir_all(&shoot).unwrap();
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        let film_id = db.get_or_create_film_roll(&shoot.to_string_lossy()).unwrap();
        Fixture {
            _tmp: tmp,
            shoot,
            db: Arc::new(db),
            sink: Arc::new(RecordingEventSink::default()),
            film_id,
        }
    }

    fn importer(f: &Fixture, reader: FakeMetadataReader, settings: CatalogSettings) -> ImageImporter {
        let cache = Arc::new(ImageCache::new(f.db.clone(), 16));
        let catalog = Arc::new(ImageCatalog::new(
            f.db.clone(),
            cache,
            f.sink.clone(),
            Arc::new(CapabilityRegistry::new()),
            1,
        ));
        ImageImporter::new(catalog, Arc::new(reader), f.sink.clone(), settings)
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"data").unwrap();
        path
    }

    #[test]
    fn test_import_with_versioned_sidecar() {
        let f = fixture();
        let raw = touch(&f.shoot, "img001.CR2");
        let sidecar = touch(&f.shoot, "img001_01.CR2.xmp");
        touch(&f.shoot, "img002_01.CR2.xmp");

        let reader = FakeMetadataReader::default()
            .with_embedded(
                &raw,
                PartialRecord {
                    maker: Some("Canon".to_string()),
                    width: Some(5184),
                    ..PartialRecord::default()
                },
            )
            .with_sidecar(
                &sidecar,
                PartialRecord {
                    exposure: Some(0.004),
                    aperture: Some(2.8),
                    iso: Some(100.0),
                    ..PartialRecord::default()
                },
            );
        let importer = importer(&f, reader, CatalogSettings::default());

        let outcome = importer.import(f.film_id, &raw, false).unwrap();
        let ImportOutcome::Imported(base) = outcome else {
            panic!("unexpected outcome {:?}", outcome);
        };

        let ids = f.db.image_group_ids(base).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], base);

        let v0 = f.db.get_image(ids[0]).unwrap().unwrap();
        let v1 = f.db.get_image(ids[1]).unwrap().unwrap();
        assert_eq!(v0.filename, "img001.CR2");
        assert_eq!(v0.maker, "Canon");
        assert_eq!(v0.rating(), 1);
        assert!(v0.flags & FLAG_RAW != 0);
        assert_eq!(v0.exposure, 0.0);
        assert_eq!(v1.maker, "Canon");
        assert_eq!(v1.exposure, 0.004);
        assert_eq!(v1.aperture, 2.8);
        assert_eq!(v1.iso, 100.0);
        assert_eq!(f.db.version_of(ids[1]).unwrap(), 1);

        let tags = f.db.get_tags_for_image(ids[1]).unwrap();
        assert_eq!(tags[0].name, "photoroll|format|cr2");

        assert_eq!(
            f.sink.names(),
            vec!["image-duplicated", "image-imported"]
        );
    }

    #[test]
    fn test_base_sidecar_read_with_version_zero_name() {
        let f = fixture();
        let raw = touch(&f.shoot, "img001.CR2");
        let base_sidecar = f.shoot.join("img001.CR2.xmp");
        let reader = FakeMetadataReader::default().with_sidecar(
            &base_sidecar,
            PartialRecord {
                caption: Some("from xmp".to_string()),
                ..PartialRecord::default()
            },
        );
        let importer = importer(&f, reader, CatalogSettings::default());

        let id = importer
            .import(f.film_id, &raw, false)
            .unwrap()
            .image_id()
            .unwrap();
        assert_eq!(f.db.get_image(id).unwrap().unwrap().caption, "from xmp");
    }

    #[test]
    fn test_reimport_returns_existing_id() {
        let f = fixture();
        let raw = touch(&f.shoot, "img001.nef");
        let importer = importer(&f, FakeMetadataReader::default(), CatalogSettings::default());

        let first = importer.import(f.film_id, &raw, false).unwrap();
        let second = importer.import(f.film_id, &raw, false).unwrap();
        assert_eq!(second, ImportOutcome::Existing(first.image_id().unwrap()));
        assert_eq!(f.db.stats().unwrap().image_count, 1);
    }

    #[test]
    fn test_concurrent_import_of_same_files_creates_one_record_each() {
        let f = fixture();
        let files: Vec<PathBuf> = (0..30)
            .map(|n| touch(&f.shoot, &format!("img{:03}.cr2", n)))
            .collect();
        let importer = importer(&f, FakeMetadataReader::default(), CatalogSettings::default());

        let imported = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for file in &files {
                        let outcome = importer.import(f.film_id, file, false).unwrap();
                        if matches!(outcome, ImportOutcome::Imported(_)) {
                            imported.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(imported.load(Ordering::SeqCst), files.len());
        let stats = f.db.stats().unwrap();
        assert_eq!(stats.image_count, files.len() as i64);
        assert_eq!(stats.duplicate_count, 0);
        for file in &files {
            let id = f
                .db
                .find_image_id(f.film_id, &basename(file).unwrap())
                .unwrap()
                .unwrap();
            assert_eq!(f.db.image_group_ids(id).unwrap(), vec![id]);
            assert_eq!(f.db.get_tags_for_image(id).unwrap().len(), 1);
        }
    }

    /// 第一次复制完成后删除源记录，使后续复制失败
    struct DropSourceAfterFirstCopy {
        db: Arc<Database>,
        fired: AtomicBool,
    }

    impl EventSink for DropSourceAfterFirstCopy {
        fn emit(&self, event_name: &str, payload_json: &str) {
            if event_name != IMAGE_DUPLICATED || self.fired.swap(true, Ordering::SeqCst) {
                return;
            }
            let payload: serde_json::Value = serde_json::from_str(payload_json).unwrap();
            let source_id = payload["sourceId"].as_i64().unwrap();
            self.db
                .transaction(|conn| {
                    conn.execute("DELETE FROM images WHERE id = ?1", [source_id])?;
                    Ok(())
                })
                .unwrap();
        }
    }

    #[test]
    fn test_duplicate_failure_midway_through_sidecars() {
        let f = fixture();
        let raw = touch(&f.shoot, "img001.CR2");
        let first = touch(&f.shoot, "img001_01.CR2.xmp");
        touch(&f.shoot, "img001_02.CR2.xmp");

        let reader = FakeMetadataReader::default().with_sidecar(
            &first,
            PartialRecord {
                caption: Some("first take".to_string()),
                ..PartialRecord::default()
            },
        );
        let sink = Arc::new(DropSourceAfterFirstCopy {
            db: f.db.clone(),
            fired: AtomicBool::new(false),
        });
        let cache = Arc::new(ImageCache::new(f.db.clone(), 16));
        let catalog = Arc::new(ImageCatalog::new(
            f.db.clone(),
            cache.clone(),
            sink.clone(),
            Arc::new(CapabilityRegistry::new()),
            1,
        ));
        let importer =
            ImageImporter::new(catalog, Arc::new(reader), sink, CatalogSettings::default());

        let err = importer.import(f.film_id, &raw, false).unwrap_err();
        let AppError::DuplicationFailed(base) = err else {
            panic!("unexpected error {:?}", err);
        };
        assert!(f.db.get_image(base).unwrap().is_none());

        // 第一个版本已完整写入，且没有遗留的写锁
        let remaining = f.db.find_image_id(f.film_id, "img001.CR2").unwrap().unwrap();
        assert_eq!(f.db.image_group_ids(remaining).unwrap(), vec![remaining]);
        assert_eq!(f.db.get_image(remaining).unwrap().unwrap().caption, "first take");
        let mut guard = cache.write(remaining).unwrap();
        guard.record_mut().caption = "edited".to_string();
        guard.release().unwrap();
        assert_eq!(f.db.get_image(remaining).unwrap().unwrap().caption, "edited");
    }

    #[test]
    fn test_skip_rules() {
        let f = fixture();
        let settings = CatalogSettings {
            ignore_jpegs: true,
            ..CatalogSettings::default()
        };
        let importer = importer(&f, FakeMetadataReader::default(), settings);

        let xmp = touch(&f.shoot, "img001.CR2.xmp");
        let txt = touch(&f.shoot, "notes.txt");
        let jpg = touch(&f.shoot, "holiday.JPG");

        assert_eq!(
            importer.import(f.film_id, &f.shoot.join("missing.cr2"), false).unwrap(),
            ImportOutcome::Skipped(SkipReason::NotAFile)
        );
        assert_eq!(
            importer.import(f.film_id, &f.shoot, false).unwrap(),
            ImportOutcome::Skipped(SkipReason::NotAFile)
        );
        assert_eq!(
            importer.import(f.film_id, &xmp, false).unwrap(),
            ImportOutcome::Skipped(SkipReason::Sidecar)
        );
        assert_eq!(
            importer.import(f.film_id, &txt, false).unwrap(),
            ImportOutcome::Skipped(SkipReason::Unsupported("txt".to_string()))
        );
        assert_eq!(
            importer.import(f.film_id, &jpg, false).unwrap(),
            ImportOutcome::Skipped(SkipReason::IgnoredJpeg)
        );
        assert_eq!(f.db.stats().unwrap().image_count, 0);

        let imported = importer.import(f.film_id, &jpg, true).unwrap();
        let id = imported.image_id().unwrap();
        let record = f.db.get_image(id).unwrap().unwrap();
        assert!(record.flags & FLAG_LDR != 0);
        assert_eq!(
            f.db.get_tags_for_image(id).unwrap()[0].name,
            "photoroll|format|jpg"
        );
    }

    #[test]
    fn test_discover_sidecars_matches_pattern() {
        let f = fixture();
        let raw = touch(&f.shoot, "img001.CR2");
        touch(&f.shoot, "img001.CR2.xmp");
        touch(&f.shoot, "img001_02.CR2.xmp");
        touch(&f.shoot, "img001_01.CR2.xmp");
        touch(&f.shoot, "img001_01.NEF.xmp");
        touch(&f.shoot, "img0011_01.CR2.xmp");

        let names: Vec<String> = discover_sidecars(&raw)
            .iter()
            .map(|p| basename(p).unwrap())
            .collect();
        assert_eq!(names, vec!["img001_01.CR2.xmp", "img001_02.CR2.xmp"]);
    }

    #[test]
    fn test_import_directory_counts() {
        let f = fixture();
        touch(&f.shoot, "a.cr2");
        touch(&f.shoot, "b.nef");
        touch(&f.shoot, "b.nef.xmp");
        touch(&f.shoot, "c.txt");
        std::fs::create_dir_all(f.shoot.join("nested")).unwrap();
        touch(&f.shoot.join("nested"), "d.cr2");

        let importer = importer(&f, FakeMetadataReader::default(), CatalogSettings::default());
        let summary = importer.import_directory(&f.shoot, false).unwrap();
        assert_eq!(summary.film_id, f.film_id);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.image_ids.len(), 2);

        let again = importer.import_directory(&f.shoot, false).unwrap();
        assert_eq!(again.existing, 2);
        assert_eq!(again.imported, 0);
        assert_eq!(again.image_ids, summary.image_ids);

        assert!(matches!(
            importer.import_directory(&f.shoot.join("nope"), false),
            Err(AppError::NotFound(_))
        ));
    }
}
