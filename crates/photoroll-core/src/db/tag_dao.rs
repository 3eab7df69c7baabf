//! 标签数据访问层
//!
//! 所有增删关联的路径都在同一事务内维护 tagxtag 共现计数：
//! 每张图片对其标签集合中的每个无序标签对贡献 +1。

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{Tag, TagPair};
use crate::utils::error::{AppError, AppResult};

use super::connection::Database;
use super::image_dao::image_row_exists;

/// 从数据库行映射到 Tag 结构
fn row_to_tag(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
    })
}

/// 图片当前标签集合中的每个标签对计数 +1
pub(crate) fn increment_pairs_for_image(conn: &Connection, image_id: i64) -> AppResult<usize> {
    let rows = conn.execute(
        r#"
        INSERT INTO tagxtag (id1, id2, count)
        SELECT a.tagid, b.tagid, 1
        FROM tagged_images AS a
        JOIN tagged_images AS b ON b.imgid = a.imgid AND a.tagid < b.tagid
        WHERE a.imgid = ?1
        ON CONFLICT(id1, id2) DO UPDATE SET count = count + 1
        "#,
        params![image_id],
    )?;
    Ok(rows)
}

/// 图片当前标签集合中的每个标签对计数 -1
///
/// 依赖尚未删除的 tagged_images 行，必须在解除关联之前调用。
pub(crate) fn decrement_pairs_for_image(conn: &Connection, image_id: i64) -> AppResult<usize> {
    let rows = conn.execute(
        r#"
        UPDATE tagxtag SET count = count - 1
        WHERE id1 IN (SELECT tagid FROM tagged_images WHERE imgid = ?1)
          AND id2 IN (SELECT tagid FROM tagged_images WHERE imgid = ?1)
        "#,
        params![image_id],
    )?;
    conn.execute("DELETE FROM tagxtag WHERE count <= 0", [])?;
    Ok(rows)
}

/// 关联标签并更新共现计数，返回是否新建了关联
///
/// 图片不存在时返回 NotFound，不留下无法由删除抵消的计数。
pub(crate) fn attach_tag_tx(conn: &Connection, image_id: i64, tag_id: i64) -> AppResult<bool> {
    if !image_row_exists(conn, image_id)? {
        return Err(AppError::NotFound(format!("图片不存在: {}", image_id)));
    }
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO tagged_images (imgid, tagid) VALUES (?1, ?2)",
        params![image_id, tag_id],
    )?;
    if inserted == 0 {
        return Ok(false);
    }

    conn.execute(
        r#"
        INSERT INTO tagxtag (id1, id2, count)
        SELECT MIN(?2, tagid), MAX(?2, tagid), 1
        FROM tagged_images
        WHERE imgid = ?1 AND tagid != ?2
        ON CONFLICT(id1, id2) DO UPDATE SET count = count + 1
        "#,
        params![image_id, tag_id],
    )?;
    Ok(true)
}

/// 解除标签关联并更新共现计数，返回是否删除了关联
pub(crate) fn detach_tag_tx(conn: &Connection, image_id: i64, tag_id: i64) -> AppResult<bool> {
    let attached: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM tagged_images WHERE imgid = ?1 AND tagid = ?2",
        params![image_id, tag_id],
        |row| row.get(0),
    )?;
    if !attached {
        return Ok(false);
    }

    conn.execute(
        r#"
        UPDATE tagxtag SET count = count - 1
        WHERE (id1 = ?2 AND id2 IN (SELECT tagid FROM tagged_images WHERE imgid = ?1))
           OR (id2 = ?2 AND id1 IN (SELECT tagid FROM tagged_images WHERE imgid = ?1))
        "#,
        params![image_id, tag_id],
    )?;
    conn.execute("DELETE FROM tagxtag WHERE count <= 0", [])?;
    conn.execute(
        "DELETE FROM tagged_images WHERE imgid = ?1 AND tagid = ?2",
        params![image_id, tag_id],
    )?;
    Ok(true)
}

impl Database {
    // ==================== Tag CRUD ====================

    /// 获取或创建标签，返回标签 ID
    pub fn get_or_create_tag(&self, name: &str) -> AppResult<i64> {
        let conn = self.connection()?;
        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
        let tag_id: i64 =
            conn.query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
                row.get(0)
            })?;
        Ok(tag_id)
    }

    /// 根据名称获取标签
    pub fn get_tag_by_name(&self, name: &str) -> AppResult<Option<Tag>> {
        let conn = self.connection()?;
        Ok(conn
            .query_row("SELECT * FROM tags WHERE name = ?1", params![name], row_to_tag)
            .optional()?)
    }

    // ==================== 关联操作 ====================

    /// 为图片添加标签
    pub fn attach_tag(&self, image_id: i64, tag_id: i64) -> AppResult<bool> {
        self.transaction(|conn| attach_tag_tx(conn, image_id, tag_id))
    }

    /// 从图片移除标签
    pub fn detach_tag(&self, image_id: i64, tag_id: i64) -> AppResult<bool> {
        self.transaction(|conn| detach_tag_tx(conn, image_id, tag_id))
    }

    /// 获取图片的所有标签
    pub fn get_tags_for_image(&self, image_id: i64) -> AppResult<Vec<Tag>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT t.* FROM tags t
            INNER JOIN tagged_images ti ON t.id = ti.tagid
            WHERE ti.imgid = ?1
            ORDER BY t.name
            "#,
        )?;
        let tags = stmt
            .query_map(params![image_id], row_to_tag)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// 获取带有某标签的所有图片 ID
    pub fn get_image_ids_for_tag(&self, tag_id: i64) -> AppResult<Vec<i64>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT imgid FROM tagged_images WHERE tagid = ?1 ORDER BY imgid")?;
        let ids = stmt
            .query_map(params![tag_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    // ==================== 共现计数 ====================

    /// 两个标签的共现计数
    pub fn tag_cooccurrence(&self, tag_a: i64, tag_b: i64) -> AppResult<i64> {
        let pair = TagPair::new(tag_a, tag_b);
        let conn = self.connection()?;
        let count: Option<i64> = conn
            .query_row(
                "SELECT count FROM tagxtag WHERE id1 = ?1 AND id2 = ?2",
                params![pair.tag_a, pair.tag_b],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    /// 完整共现矩阵（只含非零项）
    pub fn tag_cooccurrence_matrix(&self) -> AppResult<BTreeMap<TagPair, i64>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT id1, id2, count FROM tagxtag WHERE count != 0")?;
        let matrix = stmt
            .query_map([], |row| {
                Ok((
                    TagPair {
                        tag_a: row.get(0)?,
                        tag_b: row.get(1)?,
                    },
                    row.get(2)?,
                ))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(matrix)
    }
}
