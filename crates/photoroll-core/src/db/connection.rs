//! 目录数据库连接
//!
//! 单个 SQLite 连接由互斥锁保护，所有 DAO 共享

use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::paths::PathProvider;
use crate::utils::error::{AppError, AppResult};

use super::schema::{INIT_SCHEMA, MIGRATIONS, SCHEMA_VERSION};

/// 数据库连接管理器
#[derive(Clone)]
pub struct Database {
    /// 数据库连接（使用 Arc<Mutex> 实现线程安全）
    conn: Arc<Mutex<Connection>>,
    /// 数据库文件路径
    path: PathBuf,
}

/// 连接级 PRAGMA：WAL 日志，5 秒忙等待
const CONNECTION_PRAGMAS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;
    PRAGMA busy_timeout = 5000;
"#;

impl Database {
    fn from_connection(conn: Connection, path: PathBuf) -> AppResult<Self> {
        conn.execute_batch(CONNECTION_PRAGMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// 打开或创建目录数据库，父目录不存在时自动创建
    pub fn open(path: PathBuf) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(&path, flags)?;
        Self::from_connection(conn, path)
    }

    /// 使用 PathProvider 打开数据库
    pub fn open_with_provider(provider: &dyn PathProvider) -> AppResult<Self> {
        Self::open(provider.database_path())
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> AppResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    /// 建表或把已有目录升级到当前 Schema 版本
    pub fn init(&self) -> AppResult<()> {
        let conn = self.connection()?;

        match applied_schema_version(&conn)? {
            None => {
                conn.execute_batch(INIT_SCHEMA)?;
                record_schema_version(&conn, SCHEMA_VERSION)?;
                tracing::info!("目录数据库已创建，Schema 版本 {}", SCHEMA_VERSION);
            }
            Some(current) => {
                let pending = MIGRATIONS.iter().filter(|m| m.version > current);
                for migration in pending {
                    tracing::info!(
                        "目录数据库迁移 v{} -> v{}: {}",
                        current,
                        migration.version,
                        migration.description
                    );
                    conn.execute_batch(migration.sql)?;
                    record_schema_version(&conn, migration.version)?;
                }
            }
        }

        Ok(())
    }

    /// 获取数据库连接（用于执行查询）
    pub fn connection(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AppError::Database(rusqlite::Error::InvalidParameterName(e.to_string())))
    }

    /// 在单个事务中执行闭包，闭包返回错误时整体回滚
    ///
    /// 闭包内只能使用传入的连接，再次调用 `connection()` 会死锁。
    pub fn transaction<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// 目录概况：图片、副本、胶卷、标签数量
    pub fn stats(&self) -> AppResult<DatabaseStats> {
        let conn = self.connection()?;
        let count = |sql: &str| -> AppResult<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

        Ok(DatabaseStats {
            image_count: count("SELECT COUNT(*) FROM images")?,
            duplicate_count: count(
                "SELECT COUNT(*) FROM images AS a WHERE EXISTS (\
                 SELECT 1 FROM images AS b \
                 WHERE b.film_id = a.film_id AND b.filename = a.filename AND b.id < a.id)",
            )?,
            film_roll_count: count("SELECT COUNT(*) FROM film_rolls")?,
            tag_count: count("SELECT COUNT(*) FROM tags")?,
            db_size: std::fs::metadata(&self.path).map(|m| m.len() as i64).unwrap_or(0),
        })
    }
}

/// 已应用的最高 Schema 版本，全新数据库返回 None
fn applied_schema_version(conn: &Connection) -> AppResult<Option<i32>> {
    let has_table: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(None);
    }
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(Some(version.unwrap_or(0)))
}

fn record_schema_version(conn: &Connection, version: i32) -> AppResult<()> {
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, crate::models::chrono_now()],
    )?;
    Ok(())
}

/// 目录概况
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub image_count: i64,
    /// 版本号大于 0 的图片（同组中存在更小 ID）
    pub duplicate_count: i64,
    pub film_roll_count: i64,
    pub tag_count: i64,
    pub db_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        db.init().expect("Failed to initialize database");

        let stats = db.stats().expect("Failed to get stats");
        assert_eq!(stats.image_count, 0);
        assert_eq!(stats.film_roll_count, 0);
        assert_eq!(stats.tag_count, 0);
        assert_eq!(stats.duplicate_count, 0);
    }

    #[test]
    fn test_stats_counts_duplicates_per_group() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        for (film_id, name) in [(1, "a.cr2"), (1, "a.cr2"), (1, "a.cr2"), (1, "b.cr2"), (2, "a.cr2")] {
            db.insert_placeholder_image(film_id, name).unwrap();
        }

        let stats = db.stats().unwrap();
        assert_eq!(stats.image_count, 5);
        assert_eq!(stats.duplicate_count, 2);
    }

    #[test]
    fn test_schema_creation() {
        let db = Database::open_in_memory().expect("Failed to open database");
        db.init().expect("Failed to initialize");

        let conn = db.connection().expect("Failed to get connection");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "images",
            "film_rolls",
            "tagged_images",
            "tagxtag",
            "color_labels",
            "meta_data",
            "history",
            "selected_images",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db.init().unwrap();

        let conn = db.connection().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();

        let result: AppResult<()> = db.transaction(|conn| {
            conn.execute("INSERT INTO tags (name) VALUES ('kept?')", [])?;
            Err(AppError::General("abort".to_string()))
        });
        assert!(result.is_err());

        let conn = db.connection().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
