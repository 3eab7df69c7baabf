//! 编辑历史与选择集访问层

use rusqlite::{params, Row};

use crate::utils::error::AppResult;

use super::connection::Database;

/// 编辑历史条目
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub image_id: i64,
    pub num: i32,
    pub operation: String,
    pub op_params: Vec<u8>,
    pub enabled: bool,
    pub date_created: String,
}

fn row_to_history(row: &Row<'_>) -> rusqlite::Result<HistoryItem> {
    Ok(HistoryItem {
        image_id: row.get("imgid")?,
        num: row.get("num")?,
        operation: row.get("operation")?,
        op_params: row.get::<_, Option<Vec<u8>>>("op_params")?.unwrap_or_default(),
        enabled: row.get::<_, i32>("enabled")? != 0,
        date_created: row.get("date_created")?,
    })
}

impl Database {
    // ==================== 编辑历史 ====================

    /// 追加一条历史，返回其序号
    pub fn append_history(&self, image_id: i64, operation: &str, op_params: &[u8]) -> AppResult<i32> {
        self.transaction(|conn| {
            let num: i32 = conn.query_row(
                "SELECT COALESCE(MAX(num) + 1, 0) FROM history WHERE imgid = ?1",
                params![image_id],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO history (imgid, num, operation, op_params, enabled, date_created) \
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                params![image_id, num, operation, op_params, crate::models::chrono_now()],
            )?;
            Ok(num)
        })
    }

    /// 图片的编辑历史（按序号）
    pub fn get_history(&self, image_id: i64) -> AppResult<Vec<HistoryItem>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT * FROM history WHERE imgid = ?1 ORDER BY num")?;
        let items = stmt
            .query_map(params![image_id], row_to_history)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// 图片是否有编辑历史
    pub fn has_history(&self, image_id: i64) -> AppResult<bool> {
        let conn = self.connection()?;
        let altered: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM history WHERE imgid = ?1",
            params![image_id],
            |row| row.get(0),
        )?;
        Ok(altered)
    }

    // ==================== 选择集 ====================

    /// 选中图片
    pub fn select_image(&self, image_id: i64) -> AppResult<bool> {
        let conn = self.connection()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO selected_images (imgid) VALUES (?1)",
            params![image_id],
        )?;
        Ok(rows > 0)
    }

    /// 当前选中的图片 ID
    pub fn selected_image_ids(&self) -> AppResult<Vec<i64>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT imgid FROM selected_images ORDER BY imgid")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// 清空选择集
    pub fn clear_selection(&self) -> AppResult<usize> {
        let conn = self.connection()?;
        Ok(conn.execute("DELETE FROM selected_images", [])?)
    }
}
