//! 胶卷数据访问层

use rusqlite::{params, OptionalExtension, Row};

use crate::models::FilmRoll;
use crate::utils::error::AppResult;

use super::connection::Database;

/// 从数据库行映射到 FilmRoll 结构
fn row_to_film_roll(row: &Row<'_>) -> rusqlite::Result<FilmRoll> {
    Ok(FilmRoll {
        id: row.get("id")?,
        folder: row.get("folder")?,
        datetime_accessed: row.get("datetime_accessed")?,
    })
}

impl Database {
    /// 获取或创建文件夹对应的胶卷，返回胶卷 ID
    pub fn get_or_create_film_roll(&self, folder: &str) -> AppResult<i64> {
        let conn = self.connection()?;

        conn.execute(
            "INSERT OR IGNORE INTO film_rolls (folder, datetime_accessed) VALUES (?1, ?2)",
            params![folder, crate::models::chrono_now()],
        )?;

        let film_id: i64 = conn.query_row(
            "SELECT id FROM film_rolls WHERE folder = ?1",
            params![folder],
            |row| row.get(0),
        )?;

        Ok(film_id)
    }

    /// 根据 ID 获取胶卷
    pub fn get_film_roll(&self, film_id: i64) -> AppResult<Option<FilmRoll>> {
        let conn = self.connection()?;
        Ok(conn
            .query_row(
                "SELECT * FROM film_rolls WHERE id = ?1",
                params![film_id],
                row_to_film_roll,
            )
            .optional()?)
    }

    /// 更新胶卷访问时间
    pub fn touch_film_roll(&self, film_id: i64) -> AppResult<bool> {
        let conn = self.connection()?;
        let rows = conn.execute(
            "UPDATE film_rolls SET datetime_accessed = ?1 WHERE id = ?2",
            params![crate::models::chrono_now(), film_id],
        )?;
        Ok(rows > 0)
    }

    /// 获取所有胶卷（最近访问的在前）
    pub fn get_all_film_rolls(&self) -> AppResult<Vec<FilmRoll>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT * FROM film_rolls ORDER BY datetime_accessed DESC, id DESC")?;
        let rolls = stmt
            .query_map([], row_to_film_roll)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rolls)
    }
}
