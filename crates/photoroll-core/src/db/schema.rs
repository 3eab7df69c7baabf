//! 数据库 Schema 定义
//!
//! 包含所有表的 CREATE 语句和迁移脚本

/// 数据库版本
pub const SCHEMA_VERSION: i32 = 2;

/// 初始化 Schema SQL
pub const INIT_SCHEMA: &str = r#"
-- 胶卷表（文件夹分组）
CREATE TABLE IF NOT EXISTS film_rolls (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    folder              TEXT NOT NULL UNIQUE,
    datetime_accessed   TEXT
);

-- 图片表（每个版本一行；film_id 不加外键，允许孤立图片）
CREATE TABLE IF NOT EXISTS images (
    id                          INTEGER PRIMARY KEY AUTOINCREMENT,
    film_id                     INTEGER NOT NULL,
    filename                    TEXT NOT NULL,
    width                       INTEGER NOT NULL DEFAULT 0,
    height                      INTEGER NOT NULL DEFAULT 0,
    output_width                INTEGER NOT NULL DEFAULT 0,
    output_height               INTEGER NOT NULL DEFAULT 0,
    orientation                 INTEGER NOT NULL DEFAULT -1,
    flags                       INTEGER NOT NULL DEFAULT 0,
    crop                        REAL NOT NULL DEFAULT 1.0,
    exposure                    REAL NOT NULL DEFAULT 0,
    aperture                    REAL NOT NULL DEFAULT 0,
    iso                         REAL NOT NULL DEFAULT 0,
    focal_length                REAL NOT NULL DEFAULT 0,
    focus_distance              REAL NOT NULL DEFAULT 0,
    datetime_taken              TEXT NOT NULL DEFAULT '0000:00:00 00:00:00',
    maker                       TEXT NOT NULL DEFAULT '',
    model                       TEXT NOT NULL DEFAULT '',
    lens                        TEXT NOT NULL DEFAULT '',
    caption                     TEXT NOT NULL DEFAULT '',
    description                 TEXT NOT NULL DEFAULT '',
    license                     TEXT NOT NULL DEFAULT '',
    sha1sum                     TEXT NOT NULL DEFAULT '',
    raw_parameters              BLOB,
    raw_denoise_threshold       REAL NOT NULL DEFAULT 0,
    raw_auto_bright_threshold   REAL NOT NULL DEFAULT 0,
    raw_black                   INTEGER NOT NULL DEFAULT 0,
    raw_maximum                 INTEGER NOT NULL DEFAULT 0
);

-- 标签表
CREATE TABLE IF NOT EXISTS tags (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name    TEXT NOT NULL UNIQUE
);

-- 图片-标签关联表
CREATE TABLE IF NOT EXISTS tagged_images (
    imgid   INTEGER NOT NULL,
    tagid   INTEGER NOT NULL,
    PRIMARY KEY (imgid, tagid)
);

-- 标签共现计数（id1 < id2）
CREATE TABLE IF NOT EXISTS tagxtag (
    id1     INTEGER NOT NULL,
    id2     INTEGER NOT NULL,
    count   INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (id1, id2),
    CHECK (id1 < id2)
);

-- 颜色标记
CREATE TABLE IF NOT EXISTS color_labels (
    imgid   INTEGER NOT NULL,
    color   INTEGER NOT NULL,
    PRIMARY KEY (imgid, color)
);

-- 自由键值元数据
CREATE TABLE IF NOT EXISTS meta_data (
    id      INTEGER NOT NULL,
    key     TEXT NOT NULL,
    value   TEXT,
    PRIMARY KEY (id, key)
);

-- 编辑历史
CREATE TABLE IF NOT EXISTS history (
    imgid           INTEGER NOT NULL,
    num             INTEGER NOT NULL,
    operation       TEXT NOT NULL,
    op_params       BLOB,
    enabled         INTEGER NOT NULL DEFAULT 1,
    date_created    TEXT NOT NULL,
    PRIMARY KEY (imgid, num)
);

-- 当前选中的图片
CREATE TABLE IF NOT EXISTS selected_images (
    imgid   INTEGER PRIMARY KEY
);

-- 数据库版本表
CREATE TABLE IF NOT EXISTS schema_version (
    version         INTEGER PRIMARY KEY,
    applied_at      TEXT NOT NULL
);

-- 索引
CREATE INDEX IF NOT EXISTS idx_images_film_filename ON images(film_id, filename);
CREATE INDEX IF NOT EXISTS idx_tagged_images_tagid ON tagged_images(tagid);
CREATE INDEX IF NOT EXISTS idx_history_imgid ON history(imgid);
"#;

/// 迁移脚本
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// 所有迁移脚本列表
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 2,
    description: "Add film_id/filename index for version resolution and tag lookups",
    sql: r#"
            CREATE INDEX IF NOT EXISTS idx_images_film_filename ON images(film_id, filename);
            CREATE INDEX IF NOT EXISTS idx_tagged_images_tagid ON tagged_images(tagid);
        "#,
}];
