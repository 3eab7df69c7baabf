//! 图片记录缓存
//!
//! 每个图片 ID 对应一个缓存槽位：一份 [`ImageRecord`] 的内存副本，加上
//! 每个细节级别各自加锁的缓冲区。记录本身由读写锁保护：读者共享，
//! 写者独占；有写者排队时新的读者也会阻塞，写者不会饿死。
//!
//! 细节级别缓冲区不经过记录锁：[`ImageCache::level`] 返回的句柄只获取
//! 该级别自己的互斥锁，写者编辑记录时缓冲区读者不受影响。
//!
//! 写守卫释放时，若记录被修改过则写回数据库。

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};

use crate::db::Database;
use crate::models::ImageRecord;
use crate::utils::error::{AppError, AppResult};

/// 细节级别（缩略图金字塔 + 浮点预览 + 全尺寸）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailLevel {
    Mip0,
    Mip1,
    Mip2,
    Mip3,
    Mip4,
    MipF,
    Full,
}

impl DetailLevel {
    pub const ALL: [DetailLevel; 7] = [
        DetailLevel::Mip0,
        DetailLevel::Mip1,
        DetailLevel::Mip2,
        DetailLevel::Mip3,
        DetailLevel::Mip4,
        DetailLevel::MipF,
        DetailLevel::Full,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct LevelBuffer {
    data: Option<Arc<Vec<u8>>>,
    stale: bool,
}

/// 单个细节级别缓冲区的句柄，只获取该级别自己的锁
pub struct LevelHandle {
    slot: Arc<Slot>,
    level: DetailLevel,
}

impl LevelHandle {
    fn buffer(&self) -> &Mutex<LevelBuffer> {
        &self.slot.levels[self.level.index()]
    }

    pub fn detail_level(&self) -> DetailLevel {
        self.level
    }

    /// 当前缓冲区；失效后返回 None
    pub fn get(&self) -> Option<Arc<Vec<u8>>> {
        let buffer = self.buffer().lock();
        if buffer.stale {
            None
        } else {
            buffer.data.clone()
        }
    }

    /// 写入新缓冲区并清除失效标记
    pub fn store(&self, data: Vec<u8>) {
        let mut buffer = self.buffer().lock();
        buffer.data = Some(Arc::new(data));
        buffer.stale = false;
    }

    /// 标记为失效
    pub fn invalidate(&self) {
        let mut buffer = self.buffer().lock();
        buffer.data = None;
        buffer.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.buffer().lock().stale
    }
}

struct Slot {
    id: i64,
    record: Arc<RwLock<ImageRecord>>,
    dirty: AtomicBool,
    removed: AtomicBool,
    last_used: AtomicU64,
    levels: [Mutex<LevelBuffer>; 7],
}

impl Slot {
    fn new(record: ImageRecord) -> Self {
        Self {
            id: record.id,
            record: Arc::new(RwLock::new(record)),
            dirty: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            last_used: AtomicU64::new(0),
            levels: Default::default(),
        }
    }

    fn invalidate_levels(&self) {
        for buffer in &self.levels {
            let mut buffer = buffer.lock();
            buffer.data = None;
            buffer.stale = true;
        }
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

/// 把脏记录写回数据库；失败时保留脏标记
fn flush_record(db: &Database, slot: &Slot, record: &ImageRecord) -> AppResult<()> {
    if slot.is_removed() {
        slot.dirty.store(false, Ordering::Release);
        return Ok(());
    }
    if !slot.dirty.swap(false, Ordering::AcqRel) {
        return Ok(());
    }
    match db.update_image(record) {
        Ok(true) => {
            tracing::debug!("flushed image {}", slot.id);
            Ok(())
        }
        Ok(false) => {
            tracing::debug!("image {} no longer in the store, flush skipped", slot.id);
            Ok(())
        }
        Err(e) => {
            slot.dirty.store(true, Ordering::Release);
            Err(e)
        }
    }
}

#[derive(Default)]
struct Registry {
    slots: HashMap<i64, Arc<Slot>>,
    clock: u64,
}

enum Hydrate {
    FromStore,
    Uninit,
}

/// 图片记录缓存（按 ID 注册的槽位集合）
pub struct ImageCache {
    db: Arc<Database>,
    capacity: usize,
    registry: Mutex<Registry>,
}

impl ImageCache {
    /// 创建缓存；`capacity` 为保留的空闲槽位上限
    pub fn new(db: Arc<Database>, capacity: usize) -> Self {
        Self {
            db,
            capacity: capacity.max(1),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// 以共享方式获取记录；有写者持有或排队时阻塞
    pub fn read(&self, image_id: i64) -> AppResult<SlotReadGuard> {
        loop {
            let slot = self.slot_for(image_id, Hydrate::FromStore)?;
            let guard = slot.record.read_arc();
            if slot.is_removed() {
                continue;
            }
            return Ok(SlotReadGuard { guard, slot });
        }
    }

    /// 以独占方式获取记录；有其他持有者时阻塞
    pub fn write(&self, image_id: i64) -> AppResult<SlotWriteGuard> {
        loop {
            let slot = self.slot_for(image_id, Hydrate::FromStore)?;
            let guard = slot.record.write_arc();
            if slot.is_removed() {
                continue;
            }
            return Ok(self.write_guard(guard, slot));
        }
    }

    /// 以独占方式获取一条未从数据库加载的空白记录（导入新图片时使用）
    pub fn write_uninit(&self, image_id: i64) -> AppResult<SlotWriteGuard> {
        loop {
            let slot = self.slot_for(image_id, Hydrate::Uninit)?;
            let mut guard = slot.record.write_arc();
            if slot.is_removed() {
                continue;
            }
            *guard = ImageRecord {
                id: image_id,
                ..ImageRecord::default()
            };
            slot.dirty.store(true, Ordering::Release);
            return Ok(self.write_guard(guard, slot));
        }
    }

    fn write_guard(
        &self,
        guard: ArcRwLockWriteGuard<RawRwLock, ImageRecord>,
        slot: Arc<Slot>,
    ) -> SlotWriteGuard {
        SlotWriteGuard {
            guard,
            slot,
            db: self.db.clone(),
            released: false,
        }
    }

    /// 取得（必要时创建）槽位，同时按容量淘汰空闲槽位
    fn slot_for(&self, image_id: i64, hydrate: Hydrate) -> AppResult<Arc<Slot>> {
        let mut registry = self.registry.lock();
        registry.clock += 1;
        let now = registry.clock;

        if let Some(slot) = registry.slots.get(&image_id) {
            slot.last_used.store(now, Ordering::Relaxed);
            return Ok(slot.clone());
        }

        let record = match hydrate {
            Hydrate::FromStore => self
                .db
                .get_image(image_id)?
                .ok_or_else(|| AppError::NotFound(format!("image {}", image_id)))?,
            Hydrate::Uninit => ImageRecord {
                id: image_id,
                ..ImageRecord::default()
            },
        };

        let slot = Arc::new(Slot::new(record));
        slot.last_used.store(now, Ordering::Relaxed);
        registry.slots.insert(image_id, slot.clone());
        self.trim(&mut registry);
        Ok(slot)
    }

    /// 淘汰最久未使用的空闲槽位，直到数量不超过容量
    fn trim(&self, registry: &mut Registry) {
        if registry.slots.len() <= self.capacity {
            return;
        }

        let mut idle: Vec<(u64, i64)> = registry
            .slots
            .values()
            .filter(|slot| Arc::strong_count(slot) == 1)
            .map(|slot| (slot.last_used.load(Ordering::Relaxed), slot.id))
            .collect();
        idle.sort_unstable();

        let excess = registry.slots.len() - self.capacity;
        for (_, id) in idle.into_iter().take(excess) {
            if let Some(slot) = registry.slots.remove(&id) {
                if slot.dirty.load(Ordering::Acquire) {
                    let record = slot.record.read();
                    if let Err(e) = flush_record(&self.db, &slot, &record) {
                        tracing::error!("failed to flush evicted image {}: {}", id, e);
                    }
                }
            }
        }
    }

    /// 细节级别缓冲区句柄，不获取记录锁
    ///
    /// 槽位未缓存时从数据库加载；图片不存在时返回 NotFound。
    pub fn level(&self, image_id: i64, level: DetailLevel) -> AppResult<LevelHandle> {
        let slot = self.slot_for(image_id, Hydrate::FromStore)?;
        Ok(LevelHandle { slot, level })
    }

    /// 使某图片所有细节级别的缓冲区失效
    pub fn invalidate_all(&self, image_id: i64) {
        let slot = self.registry.lock().slots.get(&image_id).cloned();
        if let Some(slot) = slot {
            slot.invalidate_levels();
        }
    }

    /// 移除槽位；之后的获取会重新从数据库加载
    pub fn evict(&self, image_id: i64) {
        if let Some(slot) = self.registry.lock().slots.remove(&image_id) {
            slot.removed.store(true, Ordering::Release);
            slot.invalidate_levels();
            tracing::debug!("evicted image {} from cache", image_id);
        }
    }

    /// 当前缓存的槽位数
    pub fn len(&self) -> usize {
        self.registry.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 写回所有仍为脏的槽位并清空缓存，返回写回的记录数
    pub fn teardown(&self) -> usize {
        let slots: Vec<Arc<Slot>> = self.registry.lock().slots.drain().map(|(_, s)| s).collect();
        let mut flushed = 0;
        for slot in slots {
            if !slot.dirty.load(Ordering::Acquire) {
                continue;
            }
            let Some(record) = slot.record.try_read() else {
                tracing::warn!("image {} still locked at teardown, not flushed", slot.id);
                continue;
            };
            match flush_record(&self.db, &slot, &record) {
                Ok(()) => flushed += 1,
                Err(e) => tracing::error!("failed to flush image {} at teardown: {}", slot.id, e),
            }
        }
        tracing::info!("image cache torn down, {} dirty records flushed", flushed);
        flushed
    }
}

/// 共享读守卫
pub struct SlotReadGuard {
    guard: ArcRwLockReadGuard<RawRwLock, ImageRecord>,
    slot: Arc<Slot>,
}

impl SlotReadGuard {
    pub fn level(&self, level: DetailLevel) -> LevelHandle {
        LevelHandle {
            slot: self.slot.clone(),
            level,
        }
    }
}

impl Deref for SlotReadGuard {
    type Target = ImageRecord;

    fn deref(&self) -> &ImageRecord {
        &self.guard
    }
}

/// 独占写守卫
///
/// 通过 [`record_mut`](Self::record_mut) 修改的记录在释放时写回数据库。
/// `Drop` 中的写回失败只记录日志，需要处理错误时调用 [`release`](Self::release)。
pub struct SlotWriteGuard {
    guard: ArcRwLockWriteGuard<RawRwLock, ImageRecord>,
    slot: Arc<Slot>,
    db: Arc<Database>,
    released: bool,
}

impl SlotWriteGuard {
    /// 可变访问记录，并标记为脏
    pub fn record_mut(&mut self) -> &mut ImageRecord {
        self.slot.dirty.store(true, Ordering::Release);
        &mut self.guard
    }

    pub fn is_dirty(&self) -> bool {
        self.slot.dirty.load(Ordering::Acquire)
    }

    pub fn level(&self, level: DetailLevel) -> LevelHandle {
        LevelHandle {
            slot: self.slot.clone(),
            level,
        }
    }

    /// 立即写回（仍持有锁）
    pub fn flush(&mut self) -> AppResult<()> {
        flush_record(&self.db, &self.slot, &self.guard)
    }

    /// 写回并释放
    pub fn release(mut self) -> AppResult<()> {
        self.released = true;
        self.flush()
    }
}

impl Deref for SlotWriteGuard {
    type Target = ImageRecord;

    fn deref(&self) -> &ImageRecord {
        &self.guard
    }
}

impl Drop for SlotWriteGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::error!("failed to flush image {}: {}", self.slot.id, e);
        }
    }
}
