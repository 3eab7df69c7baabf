//! 目录引擎
//!
//! 图片的复制（新建版本）与删除、标签关联，以及胶卷显示名等查询。
//! 复制与删除各自在单个事务中完成，标签共现计数与关联变更同时提交。

use std::path::PathBuf;
use std::sync::Arc;

use crate::db::image_dao::{delete_image_tx, duplicate_image_tx, load_image};
use crate::db::tag_dao::{decrement_pairs_for_image, increment_pairs_for_image};
use crate::db::Database;
use crate::events::{
    EventSinkExt, ImageDuplicatedPayload, ImageRemovedPayload, SharedEventSink,
    IMAGE_DUPLICATED, IMAGE_REMOVED,
};
use crate::models::{Tag, ORPHANED_IMAGE_NAME};
use crate::services::cache::ImageCache;
use crate::services::capability::{CapabilityRegistry, ParamValue};
use crate::utils::error::{AppError, AppResult};
use crate::utils::path::film_roll_display_name;

/// 目录引擎
pub struct ImageCatalog {
    db: Arc<Database>,
    cache: Arc<ImageCache>,
    events: SharedEventSink,
    capabilities: Arc<CapabilityRegistry>,
    show_folder_levels: i32,
}

impl ImageCatalog {
    pub fn new(
        db: Arc<Database>,
        cache: Arc<ImageCache>,
        events: SharedEventSink,
        capabilities: Arc<CapabilityRegistry>,
        show_folder_levels: i32,
    ) -> Self {
        Self {
            db,
            cache,
            events,
            capabilities,
            show_folder_levels,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// 复制图片为同组的新版本，返回新 ID
    ///
    /// 源图片不存在时返回 [`AppError::DuplicationFailed`]。
    pub fn duplicate(&self, source_id: i64) -> AppResult<i64> {
        let new_id = self.db.transaction(|conn| {
            let new_id = duplicate_image_tx(conn, source_id)?;
            increment_pairs_for_image(conn, new_id)?;
            Ok(new_id)
        })?;

        tracing::debug!("duplicated image {} -> {}", source_id, new_id);
        self.events.emit_typed(
            IMAGE_DUPLICATED,
            &ImageDuplicatedPayload { source_id, new_id },
        );
        Ok(new_id)
    }

    /// 删除图片及所有依赖行；图片不存在时什么也不做
    pub fn remove(&self, image_id: i64) -> AppResult<()> {
        let removed = self.db.transaction(|conn| {
            if load_image(conn, image_id)?.is_none() {
                return Ok(false);
            }
            decrement_pairs_for_image(conn, image_id)?;
            delete_image_tx(conn, image_id)
        })?;

        self.cache.evict(image_id);

        if removed {
            tracing::debug!("removed image {}", image_id);
            self.events
                .emit_typed(IMAGE_REMOVED, &ImageRemovedPayload { image_id });
        }
        Ok(())
    }

    /// 按名称为图片添加标签（标签不存在时创建），返回是否新建了关联
    pub fn attach_tag(&self, image_id: i64, tag_name: &str) -> AppResult<bool> {
        let tag_id = self.db.get_or_create_tag(tag_name)?;
        self.db.attach_tag(image_id, tag_id)
    }

    /// 按名称移除图片的标签，返回是否删除了关联
    pub fn detach_tag(&self, image_id: i64, tag_name: &str) -> AppResult<bool> {
        match self.db.get_tag_by_name(tag_name)? {
            Some(tag) => self.db.detach_tag(image_id, tag.id),
            None => Ok(false),
        }
    }

    pub fn tags(&self, image_id: i64) -> AppResult<Vec<Tag>> {
        self.db.get_tags_for_image(image_id)
    }

    /// 同组所有版本的 ID，下标即版本号
    pub fn versions(&self, image_id: i64) -> AppResult<Vec<i64>> {
        let ids = self.db.image_group_ids(image_id)?;
        if ids.is_empty() {
            return Err(AppError::NotFound(format!("image {}", image_id)));
        }
        Ok(ids)
    }

    /// 胶卷显示名：文件夹的最后若干级；胶卷不存在时为 "orphaned image"
    pub fn film_roll_name(&self, image_id: i64) -> AppResult<String> {
        let image = self.cache.read(image_id)?;
        let film_id = image.film_id;
        drop(image);

        Ok(match self.db.get_film_roll(film_id)? {
            Some(roll) => film_roll_display_name(&roll.folder, self.show_folder_levels).to_string(),
            None => ORPHANED_IMAGE_NAME.to_string(),
        })
    }

    /// 原始文件完整路径；孤立图片返回 None
    pub fn full_path(&self, image_id: i64) -> AppResult<Option<PathBuf>> {
        self.db.image_full_path(image_id)
    }

    /// 是否有编辑历史
    pub fn is_altered(&self, image_id: i64) -> AppResult<bool> {
        self.db.has_history(image_id)
    }

    /// 通过处理模块读取图片参数块中的字段
    pub fn raw_param(
        &self,
        image_id: i64,
        producer: &str,
        field: &str,
    ) -> AppResult<Option<ParamValue>> {
        let introspect = self
            .capabilities
            .resolve_capability(producer)
            .ok_or_else(|| AppError::Unsupported(format!("unknown parameter producer: {}", producer)))?;

        let image = self.cache.read(image_id)?;
        Ok(introspect.get_field(&image.raw_parameters, field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ColorLabel;
    use crate::events::testing::RecordingEventSink;
    use crate::models::{TagPair, INVALID_IMAGE_ID};
    use crate::services::capability::{RawImportParams, RAW_IMPORT};
    use std::collections::BTreeMap;
    use std::thread;

    struct Fixture {
        db: Arc<Database>,
        catalog: ImageCatalog,
        sink: Arc<RecordingEventSink>,
        film_id: i64,
    }

    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        let db = Arc::new(db);
        let cache = Arc::new(ImageCache::new(db.clone(), 16));
        let sink = Arc::new(RecordingEventSink::default());
        let catalog = ImageCatalog::new(
            db.clone(),
            cache,
            sink.clone(),
            Arc::new(CapabilityRegistry::new()),
            2,
        );
        let film_id = db.get_or_create_film_roll("/photos/2011/summer").unwrap();
        Fixture {
            db,
            catalog,
            sink,
            film_id,
        }
    }

    fn insert(f: &Fixture, filename: &str) -> i64 {
        f.db.insert_placeholder_image(f.film_id, filename).unwrap();
        *f.db
            .image_group_ids(f.db.find_image_id(f.film_id, filename).unwrap().unwrap())
            .unwrap()
            .last()
            .unwrap()
    }

    /// 由 tagged_images 重新计算的共现矩阵
    fn recomputed_matrix(db: &Database) -> BTreeMap<TagPair, i64> {
        let conn = db.connection().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT a.tagid, b.tagid, COUNT(*) FROM tagged_images AS a \
                 JOIN tagged_images AS b ON a.imgid = b.imgid AND a.tagid < b.tagid \
                 GROUP BY a.tagid, b.tagid",
            )
            .unwrap();
        let matrix = stmt
            .query_map([], |row| Ok((TagPair::new(row.get(0)?, row.get(1)?), row.get(2)?)))
            .unwrap()
            .collect::<Result<BTreeMap<_, _>, _>>()
            .unwrap();
        matrix
    }

    #[test]
    fn test_duplicate_copies_record_and_dependents() {
        let f = setup();
        let src = insert(&f, "img001.CR2");
        let mut img = f.db.get_image(src).unwrap().unwrap();
        img.width = 4000;
        img.height = 3000;
        img.output_width = 800;
        img.output_height = 600;
        img.maker = "Canon".to_string();
        f.db.update_image(&img).unwrap();
        f.db.add_color_label(src, ColorLabel::Red).unwrap();
        f.db.set_meta_data(src, "creator", "me").unwrap();
        f.catalog.attach_tag(src, "a").unwrap();
        f.catalog.attach_tag(src, "b").unwrap();

        let dup = f.catalog.duplicate(src).unwrap();
        assert!(dup > src);

        let copy = f.db.get_image(dup).unwrap().unwrap();
        assert_eq!(copy.filename, "img001.CR2");
        assert_eq!(copy.maker, "Canon");
        assert_eq!((copy.output_width, copy.output_height), (4000, 3000));
        assert_eq!(f.db.get_color_labels(dup).unwrap(), vec![ColorLabel::Red]);
        assert_eq!(f.db.get_meta_data(dup).unwrap().get("creator").unwrap(), "me");
        assert_eq!(f.catalog.tags(dup).unwrap().len(), 2);

        assert_eq!(f.db.version_of(src).unwrap(), 0);
        assert_eq!(f.db.version_of(dup).unwrap(), 1);
        assert_eq!(f.sink.names(), vec!["image-duplicated"]);
    }

    #[test]
    fn test_duplicate_counts_tag_pairs() {
        let f = setup();
        let src = insert(&f, "img001.CR2");
        for tag in ["a", "b", "c"] {
            f.catalog.attach_tag(src, tag).unwrap();
        }
        let a = f.db.get_or_create_tag("a").unwrap();
        let b = f.db.get_or_create_tag("b").unwrap();
        let c = f.db.get_or_create_tag("c").unwrap();

        f.catalog.duplicate(src).unwrap();
        assert_eq!(f.db.tag_cooccurrence(a, b).unwrap(), 2);
        assert_eq!(f.db.tag_cooccurrence(a, c).unwrap(), 2);
        assert_eq!(f.db.tag_cooccurrence(b, c).unwrap(), 2);
    }

    #[test]
    fn test_duplicate_missing_source_fails() {
        let f = setup();
        let err = f.catalog.duplicate(4242).unwrap_err();
        assert!(matches!(err, AppError::DuplicationFailed(4242)));
        assert_eq!(f.db.stats().unwrap().image_count, 0);
        assert_ne!(INVALID_IMAGE_ID, 4242);
        assert!(f.sink.names().is_empty());
    }

    #[test]
    fn test_duplicate_then_remove_restores_tag_matrix() {
        let f = setup();
        let src = insert(&f, "img001.CR2");
        for tag in ["a", "b", "c"] {
            f.catalog.attach_tag(src, tag).unwrap();
        }
        let before = f.db.tag_cooccurrence_matrix().unwrap();

        let dup = f.catalog.duplicate(src).unwrap();
        assert_ne!(f.db.tag_cooccurrence_matrix().unwrap(), before);

        f.catalog.remove(dup).unwrap();
        assert_eq!(f.db.tag_cooccurrence_matrix().unwrap(), before);
    }

    #[test]
    fn test_remove_erases_dependents_and_evicts() {
        let f = setup();
        let id = insert(&f, "img001.CR2");
        f.catalog.attach_tag(id, "a").unwrap();
        f.db.add_color_label(id, ColorLabel::Blue).unwrap();
        f.db.set_meta_data(id, "k", "v").unwrap();
        f.db.append_history(id, "exposure", &[1, 2]).unwrap();
        f.db.select_image(id).unwrap();
        drop(f.catalog.cache().read(id).unwrap());

        f.catalog.remove(id).unwrap();

        assert!(f.db.get_image(id).unwrap().is_none());
        assert!(f.catalog.tags(id).unwrap().is_empty());
        assert!(f.db.get_color_labels(id).unwrap().is_empty());
        assert!(f.db.get_meta_data(id).unwrap().is_empty());
        assert!(!f.catalog.is_altered(id).unwrap());
        assert!(f.db.selected_image_ids().unwrap().is_empty());
        assert!(matches!(
            f.catalog.cache().read(id),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(f.sink.names(), vec!["image-removed"]);
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let f = setup();
        let a = f.db.get_or_create_tag("a").unwrap();
        let b = f.db.get_or_create_tag("b").unwrap();
        // 指向不存在图片的关联行不应影响计数
        f.db.transaction(|conn| {
            conn.execute(
                "INSERT INTO tagged_images (imgid, tagid) VALUES (777, ?1), (777, ?2)",
                [a, b],
            )?;
            Ok(())
        })
        .unwrap();
        let before = f.db.tag_cooccurrence_matrix().unwrap();

        f.catalog.remove(777).unwrap();
        assert_eq!(f.db.tag_cooccurrence_matrix().unwrap(), before);
        assert!(f.sink.names().is_empty());
    }

    #[test]
    fn test_attach_tag_to_missing_image_fails() {
        let f = setup();
        assert!(matches!(
            f.catalog.attach_tag(999, "a"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.catalog.attach_tag(999, "b"),
            Err(AppError::NotFound(_))
        ));

        f.catalog.remove(999).unwrap();
        assert!(f.db.tag_cooccurrence_matrix().unwrap().is_empty());
        assert!(f.catalog.tags(999).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_duplicate_and_remove_keep_counts_exact() {
        let f = setup();
        let src = insert(&f, "img001.CR2");
        for tag in ["a", "b", "c"] {
            f.catalog.attach_tag(src, tag).unwrap();
        }

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for round in 0..10 {
                        let dup = f.catalog.duplicate(src).unwrap();
                        if round % 2 == 0 {
                            f.catalog.remove(dup).unwrap();
                        }
                    }
                });
            }
        });

        let versions = f.catalog.versions(src).unwrap();
        assert_eq!(versions.len(), 1 + 4 * 5);
        assert_eq!(versions[0], src);
        for (version, id) in versions.iter().enumerate() {
            assert_eq!(f.db.version_of(*id).unwrap() as usize, version);
        }

        let a = f.db.get_or_create_tag("a").unwrap();
        let b = f.db.get_or_create_tag("b").unwrap();
        assert_eq!(f.db.tag_cooccurrence(a, b).unwrap(), 21);
        assert_eq!(f.db.tag_cooccurrence_matrix().unwrap(), recomputed_matrix(&f.db));
    }

    #[test]
    fn test_versions_stay_dense_after_removal() {
        let f = setup();
        let base = insert(&f, "img001.CR2");
        let v1 = f.catalog.duplicate(base).unwrap();
        let v2 = f.catalog.duplicate(base).unwrap();
        let other = insert(&f, "img002.CR2");

        f.catalog.remove(other).unwrap();
        assert_eq!(f.catalog.versions(base).unwrap(), vec![base, v1, v2]);

        f.catalog.remove(v1).unwrap();
        assert_eq!(f.db.version_of(v2).unwrap(), 1);
        assert_eq!(f.catalog.versions(v2).unwrap(), vec![base, v2]);
        assert!(matches!(f.catalog.versions(v1), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_film_roll_name_and_orphans() {
        let f = setup();
        let id = insert(&f, "img001.CR2");
        assert_eq!(f.catalog.film_roll_name(id).unwrap(), "2011/summer");
        assert_eq!(
            f.catalog.full_path(id).unwrap(),
            Some(PathBuf::from("/photos/2011/summer/img001.CR2"))
        );

        f.db.insert_placeholder_image(9999, "lost.nef").unwrap();
        let orphan = f.db.find_image_id(9999, "lost.nef").unwrap().unwrap();
        assert_eq!(f.catalog.film_roll_name(orphan).unwrap(), ORPHANED_IMAGE_NAME);
        assert_eq!(f.catalog.full_path(orphan).unwrap(), None);
    }

    #[test]
    fn test_is_altered_and_detach() {
        let f = setup();
        let id = insert(&f, "img001.CR2");
        assert!(!f.catalog.is_altered(id).unwrap());
        f.db.append_history(id, "crop", &[]).unwrap();
        assert!(f.catalog.is_altered(id).unwrap());

        f.catalog.attach_tag(id, "a").unwrap();
        assert!(f.catalog.detach_tag(id, "a").unwrap());
        assert!(!f.catalog.detach_tag(id, "never-created").unwrap());
    }

    #[test]
    fn test_raw_param_lookup() {
        let f = setup();
        let id = insert(&f, "img001.CR2");
        {
            let mut guard = f.catalog.cache().write(id).unwrap();
            guard.record_mut().raw_parameters = RawImportParams::pack(3, false, 1, 0);
            guard.release().unwrap();
        }

        assert_eq!(
            f.catalog.raw_param(id, RAW_IMPORT, "user_flip").unwrap(),
            Some(ParamValue::Int(3))
        );
        assert_eq!(
            f.catalog.raw_param(id, RAW_IMPORT, "wb_auto").unwrap(),
            Some(ParamValue::Bool(false))
        );
        assert!(matches!(
            f.catalog.raw_param(id, "denoise", "strength"),
            Err(AppError::Unsupported(_))
        ));
    }
}
