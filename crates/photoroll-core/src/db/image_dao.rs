//! 图片数据访问层

use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::ImageRecord;
use crate::utils::error::{AppError, AppResult};

use super::connection::Database;

/// images 表中映射到 ImageRecord 的列
const IMAGE_COLUMNS: &str = "id, film_id, filename, width, height, output_width, output_height, \
     orientation, flags, crop, exposure, aperture, iso, focal_length, focus_distance, \
     datetime_taken, maker, model, lens, caption, description, license, raw_parameters, \
     raw_denoise_threshold, raw_auto_bright_threshold, raw_black, raw_maximum";

/// 从数据库行映射到 ImageRecord 结构
fn row_to_image(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get("id")?,
        film_id: row.get("film_id")?,
        filename: row.get("filename")?,
        width: row.get("width")?,
        height: row.get("height")?,
        output_width: row.get("output_width")?,
        output_height: row.get("output_height")?,
        orientation: row.get("orientation")?,
        flags: row.get("flags")?,
        crop: row.get::<_, f64>("crop")? as f32,
        exposure: row.get::<_, f64>("exposure")? as f32,
        aperture: row.get::<_, f64>("aperture")? as f32,
        iso: row.get::<_, f64>("iso")? as f32,
        focal_length: row.get::<_, f64>("focal_length")? as f32,
        focus_distance: row.get::<_, f64>("focus_distance")? as f32,
        datetime_taken: row.get("datetime_taken")?,
        maker: row.get("maker")?,
        model: row.get("model")?,
        lens: row.get("lens")?,
        caption: row.get("caption")?,
        description: row.get("description")?,
        license: row.get("license")?,
        raw_parameters: row
            .get::<_, Option<Vec<u8>>>("raw_parameters")?
            .unwrap_or_default(),
        raw_denoise_threshold: row.get::<_, f64>("raw_denoise_threshold")? as f32,
        raw_auto_bright_threshold: row.get::<_, f64>("raw_auto_bright_threshold")? as f32,
        raw_black: row.get("raw_black")?,
        raw_maximum: row.get("raw_maximum")?,
    })
}

/// 按 ID 读取图片记录
pub(crate) fn load_image(conn: &Connection, image_id: i64) -> AppResult<Option<ImageRecord>> {
    let sql = format!("SELECT {} FROM images WHERE id = ?1", IMAGE_COLUMNS);
    Ok(conn.query_row(&sql, params![image_id], row_to_image).optional()?)
}

/// 按 (film_id, filename) 查找最早的图片 ID
pub(crate) fn lookup_image_id(
    conn: &Connection,
    film_id: i64,
    filename: &str,
) -> AppResult<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM images WHERE film_id = ?1 AND filename = ?2 ORDER BY id LIMIT 1",
            params![film_id, filename],
            |row| row.get(0),
        )
        .optional()?)
}

/// 图片行是否存在
pub(crate) fn image_row_exists(conn: &Connection, image_id: i64) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM images WHERE id = ?1)",
        params![image_id],
        |row| row.get(0),
    )?)
}

/// 插入只有文件名的占位记录
fn insert_placeholder(conn: &Connection, film_id: i64, filename: &str) -> AppResult<()> {
    conn.execute(
        "INSERT INTO images (film_id, filename, caption, description, license, sha1sum) \
         VALUES (?1, ?2, '', '', '', '')",
        params![film_id, filename],
    )?;
    Ok(())
}

/// 按 (film_id, filename) 取得版本 0 的 ID，不存在时插入占位记录
///
/// 返回 (ID, 是否新插入)。查找与插入必须在同一事务内执行。
pub(crate) fn claim_image_tx(conn: &Connection, film_id: i64, filename: &str) -> AppResult<(i64, bool)> {
    if let Some(id) = lookup_image_id(conn, film_id, filename)? {
        return Ok((id, false));
    }
    insert_placeholder(conn, film_id, filename)?;
    let id = lookup_image_id(conn, film_id, filename)?
        .ok_or_else(|| AppError::General(format!("占位记录未找到: {}", filename)))?;
    Ok((id, true))
}

/// 图片的版本号：同组 (film_id, filename) 中 ID 更小的记录数
pub(crate) fn image_version(conn: &Connection, image_id: i64) -> AppResult<u32> {
    let group: Option<(i64, String)> = conn
        .query_row(
            "SELECT film_id, filename FROM images WHERE id = ?1",
            params![image_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (film_id, filename) =
        group.ok_or_else(|| AppError::NotFound(format!("图片不存在: {}", image_id)))?;

    let version: u32 = conn.query_row(
        "SELECT COUNT(*) FROM images WHERE film_id = ?1 AND filename = ?2 AND id < ?3",
        params![film_id, filename, image_id],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// 把记录字段写回 images 表
pub(crate) fn write_image(conn: &Connection, img: &ImageRecord) -> AppResult<bool> {
    let rows = conn.execute(
        r#"
        UPDATE images SET
            film_id = ?1, filename = ?2, width = ?3, height = ?4,
            output_width = ?5, output_height = ?6, orientation = ?7, flags = ?8,
            crop = ?9, exposure = ?10, aperture = ?11, iso = ?12,
            focal_length = ?13, focus_distance = ?14, datetime_taken = ?15,
            maker = ?16, model = ?17, lens = ?18, caption = ?19,
            description = ?20, license = ?21, raw_parameters = ?22,
            raw_denoise_threshold = ?23, raw_auto_bright_threshold = ?24,
            raw_black = ?25, raw_maximum = ?26
        WHERE id = ?27
        "#,
        params![
            img.film_id,
            img.filename,
            img.width,
            img.height,
            img.output_width,
            img.output_height,
            img.orientation,
            img.flags,
            img.crop as f64,
            img.exposure as f64,
            img.aperture as f64,
            img.iso as f64,
            img.focal_length as f64,
            img.focus_distance as f64,
            img.datetime_taken,
            img.maker,
            img.model,
            img.lens,
            img.caption,
            img.description,
            img.license,
            img.raw_parameters,
            img.raw_denoise_threshold as f64,
            img.raw_auto_bright_threshold as f64,
            img.raw_black,
            img.raw_maximum,
            img.id,
        ],
    )?;
    Ok(rows > 0)
}

/// 在事务内复制图片记录及其颜色标记、元数据和标签，返回新 ID
///
/// 输出尺寸重置为源图片的原始尺寸；标签共现计数由调用方维护。
pub(crate) fn duplicate_image_tx(conn: &Connection, source_id: i64) -> AppResult<i64> {
    let inserted = conn.execute(
        r#"
        INSERT INTO images (
            film_id, filename, width, height, output_width, output_height,
            orientation, flags, crop, exposure, aperture, iso, focal_length,
            focus_distance, datetime_taken, maker, model, lens, caption,
            description, license, sha1sum, raw_parameters, raw_denoise_threshold,
            raw_auto_bright_threshold, raw_black, raw_maximum
        )
        SELECT
            film_id, filename, width, height, width, height,
            orientation, flags, crop, exposure, aperture, iso, focal_length,
            focus_distance, datetime_taken, maker, model, lens, caption,
            description, license, sha1sum, raw_parameters, raw_denoise_threshold,
            raw_auto_bright_threshold, raw_black, raw_maximum
        FROM images WHERE id = ?1
        "#,
        params![source_id],
    )?;
    if inserted == 0 {
        return Err(AppError::DuplicationFailed(source_id));
    }

    let new_id: Option<i64> = conn.query_row(
        r#"
        SELECT MAX(a.id) FROM images AS a
        JOIN images AS b ON a.film_id = b.film_id AND a.filename = b.filename
        WHERE b.id = ?1
        "#,
        params![source_id],
        |row| row.get(0),
    )?;
    let new_id = new_id.ok_or(AppError::DuplicationFailed(source_id))?;

    conn.execute(
        "INSERT INTO color_labels (imgid, color) SELECT ?1, color FROM color_labels WHERE imgid = ?2",
        params![new_id, source_id],
    )?;
    conn.execute(
        "INSERT INTO meta_data (id, key, value) SELECT ?1, key, value FROM meta_data WHERE id = ?2",
        params![new_id, source_id],
    )?;
    conn.execute(
        "INSERT INTO tagged_images (imgid, tagid) SELECT ?1, tagid FROM tagged_images WHERE imgid = ?2",
        params![new_id, source_id],
    )?;

    Ok(new_id)
}

/// 在事务内删除图片记录及所有依赖行，返回图片是否存在
///
/// 标签关联在这里删除，调用方需先递减共现计数。
pub(crate) fn delete_image_tx(conn: &Connection, image_id: i64) -> AppResult<bool> {
    let rows = conn.execute("DELETE FROM images WHERE id = ?1", params![image_id])?;
    if rows == 0 {
        return Ok(false);
    }
    conn.execute("DELETE FROM tagged_images WHERE imgid = ?1", params![image_id])?;
    conn.execute("DELETE FROM history WHERE imgid = ?1", params![image_id])?;
    conn.execute("DELETE FROM color_labels WHERE imgid = ?1", params![image_id])?;
    conn.execute("DELETE FROM meta_data WHERE id = ?1", params![image_id])?;
    conn.execute("DELETE FROM selected_images WHERE imgid = ?1", params![image_id])?;
    Ok(true)
}

impl Database {
    // ==================== Image CRUD ====================

    /// 无条件插入占位图片记录（同组已有记录时成为新版本）
    ///
    /// 不返回 ID，调用方按 (film_id, filename) 重新查询。导入使用 [`claim_image`](Self::claim_image)。
    pub fn insert_placeholder_image(&self, film_id: i64, filename: &str) -> AppResult<()> {
        let conn = self.connection()?;
        insert_placeholder(&conn, film_id, filename)
    }

    /// 取得 (film_id, filename) 的版本 0；不存在时原子地插入占位记录
    ///
    /// 返回 (ID, 是否新插入)。并发调用同一文件时只有一个调用者得到 true。
    pub fn claim_image(&self, film_id: i64, filename: &str) -> AppResult<(i64, bool)> {
        self.transaction(|conn| claim_image_tx(conn, film_id, filename))
    }

    /// 根据 ID 获取图片
    pub fn get_image(&self, image_id: i64) -> AppResult<Option<ImageRecord>> {
        let conn = self.connection()?;
        load_image(&conn, image_id)
    }

    /// 按 (film_id, filename) 查找版本 0 的图片 ID
    pub fn find_image_id(&self, film_id: i64, filename: &str) -> AppResult<Option<i64>> {
        let conn = self.connection()?;
        lookup_image_id(&conn, film_id, filename)
    }

    /// 更新图片记录，返回是否有行被修改
    pub fn update_image(&self, img: &ImageRecord) -> AppResult<bool> {
        let conn = self.connection()?;
        write_image(&conn, img)
    }

    /// 图片是否存在
    pub fn image_exists(&self, image_id: i64) -> AppResult<bool> {
        let conn = self.connection()?;
        image_row_exists(&conn, image_id)
    }

    /// 图片的版本号（版本 0 为原始文件）
    pub fn version_of(&self, image_id: i64) -> AppResult<u32> {
        let conn = self.connection()?;
        image_version(&conn, image_id)
    }

    /// 与给定图片共享 (film_id, filename) 的所有图片 ID，按 ID 升序
    pub fn image_group_ids(&self, image_id: i64) -> AppResult<Vec<i64>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT a.id FROM images AS a
            JOIN images AS b ON a.film_id = b.film_id AND a.filename = b.filename
            WHERE b.id = ?1
            ORDER BY a.id
            "#,
        )?;
        let ids = stmt
            .query_map(params![image_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// 原始文件完整路径（胶卷文件夹 + 文件名）；孤立图片返回 None
    pub fn image_full_path(&self, image_id: i64) -> AppResult<Option<PathBuf>> {
        let conn = self.connection()?;
        let result: Option<(String, String)> = conn
            .query_row(
                "SELECT f.folder, i.filename FROM images AS i \
                 JOIN film_rolls AS f ON i.film_id = f.id WHERE i.id = ?1",
                params![image_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(result.map(|(folder, filename)| PathBuf::from(folder).join(filename)))
    }
}
