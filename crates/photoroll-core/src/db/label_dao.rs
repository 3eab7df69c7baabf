//! 颜色标记与键值元数据访问层

use std::collections::BTreeMap;

use rusqlite::params;

use crate::utils::error::AppResult;

use super::connection::Database;

/// 颜色标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorLabel {
    Red = 0,
    Yellow = 1,
    Green = 2,
    Blue = 3,
    Purple = 4,
}

impl ColorLabel {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(ColorLabel::Red),
            1 => Some(ColorLabel::Yellow),
            2 => Some(ColorLabel::Green),
            3 => Some(ColorLabel::Blue),
            4 => Some(ColorLabel::Purple),
            _ => None,
        }
    }
}

impl Database {
    // ==================== 颜色标记 ====================

    /// 添加颜色标记
    pub fn add_color_label(&self, image_id: i64, label: ColorLabel) -> AppResult<bool> {
        let conn = self.connection()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO color_labels (imgid, color) VALUES (?1, ?2)",
            params![image_id, label as i32],
        )?;
        Ok(rows > 0)
    }

    /// 移除颜色标记
    pub fn remove_color_label(&self, image_id: i64, label: ColorLabel) -> AppResult<bool> {
        let conn = self.connection()?;
        let rows = conn.execute(
            "DELETE FROM color_labels WHERE imgid = ?1 AND color = ?2",
            params![image_id, label as i32],
        )?;
        Ok(rows > 0)
    }

    /// 图片的所有颜色标记
    pub fn get_color_labels(&self, image_id: i64) -> AppResult<Vec<ColorLabel>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT color FROM color_labels WHERE imgid = ?1 ORDER BY color")?;
        let labels = stmt
            .query_map(params![image_id], |row| row.get::<_, i32>(0))?
            .filter_map(|r| r.ok())
            .filter_map(ColorLabel::from_index)
            .collect();
        Ok(labels)
    }

    // ==================== 键值元数据 ====================

    /// 设置元数据（覆盖同名键）
    pub fn set_meta_data(&self, image_id: i64, key: &str, value: &str) -> AppResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO meta_data (id, key, value) VALUES (?1, ?2, ?3) \
             ON CONFLICT(id, key) DO UPDATE SET value = excluded.value",
            params![image_id, key, value],
        )?;
        Ok(())
    }

    /// 图片的所有元数据
    pub fn get_meta_data(&self, image_id: i64) -> AppResult<BTreeMap<String, String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT key, value FROM meta_data WHERE id = ?1")?;
        let entries = stmt
            .query_map(params![image_id], |row| {
                Ok((row.get(0)?, row.get::<_, Option<String>>(1)?.unwrap_or_default()))
            })?
            .collect::<Result<BTreeMap<String, String>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_labels() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();

        assert!(db.add_color_label(1, ColorLabel::Green).unwrap());
        assert!(!db.add_color_label(1, ColorLabel::Green).unwrap());
        db.add_color_label(1, ColorLabel::Red).unwrap();
        assert_eq!(
            db.get_color_labels(1).unwrap(),
            vec![ColorLabel::Red, ColorLabel::Green]
        );
        assert!(db.remove_color_label(1, ColorLabel::Red).unwrap());
        assert_eq!(db.get_color_labels(1).unwrap(), vec![ColorLabel::Green]);
    }

    #[test]
    fn test_meta_data_overwrites_key() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();

        db.set_meta_data(1, "creator", "anna").unwrap();
        db.set_meta_data(1, "creator", "ben").unwrap();
        db.set_meta_data(1, "rights", "CC-BY").unwrap();

        let meta = db.get_meta_data(1).unwrap();
        assert_eq!(meta.len(), 2);
        assert_eq!(meta["creator"], "ben");
    }
}
