// ==========================================
// 档案批量导入引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键 + busy_timeout）
// - 建库: 层级节点表 / 客户 / 土地 / 文件 / 导入运行 / 配置
// - 唯一索引承担并发运行之间的去重（get-or-create 竞争）
// ==========================================

use crate::domain::types::NodeKind;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建库（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    let mut ddl = String::new();

    // 层级节点表: 根节点 parent_id 为 NULL，唯一键统一为 (IFNULL(parent_id,0), name)
    for kind in NodeKind::ALL {
        let table = kind.table();
        let parent_ref = match kind.parent() {
            Some(parent) => format!("REFERENCES {}(id)", parent.table()),
            None => String::new(),
        };
        ddl.push_str(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                parent_id INTEGER {parent_ref},
                name TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_{table}_parent_name
                ON {table}(IFNULL(parent_id, 0), name);
            "#
        ));
    }

    ddl.push_str(SCHEMA_SQL);
    conn.execute_batch(&ddl)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 打开连接并确保表结构存在
pub fn open_and_init(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS client (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    national_id TEXT,
    client_code TEXT NOT NULL,
    telephone TEXT,
    mobile TEXT,
    notes TEXT,
    excel_row_number INTEGER,
    files_code TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE UNIQUE INDEX IF NOT EXISTS ux_client_name ON client(name);

CREATE TABLE IF NOT EXISTS land (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id INTEGER NOT NULL REFERENCES client(id),
    land_no TEXT NOT NULL,
    unit_no TEXT,
    governorate_id INTEGER REFERENCES governorate(id),
    city_id INTEGER REFERENCES city(id),
    district_id INTEGER REFERENCES district(id),
    zone_id INTEGER REFERENCES zone(id),
    area_id INTEGER REFERENCES area(id),
    room_id INTEGER REFERENCES room(id),
    lane_id INTEGER REFERENCES lane(id),
    stand_id INTEGER REFERENCES stand(id),
    rack_id INTEGER REFERENCES rack(id),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE UNIQUE INDEX IF NOT EXISTS ux_land_key
    ON land(client_id, land_no, IFNULL(governorate_id, 0));

CREATE TABLE IF NOT EXISTS archive_file (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id INTEGER NOT NULL REFERENCES client(id),
    land_id INTEGER NOT NULL REFERENCES land(id),
    room_id INTEGER REFERENCES room(id),
    lane_id INTEGER REFERENCES lane(id),
    stand_id INTEGER REFERENCES stand(id),
    rack_id INTEGER REFERENCES rack(id),
    file_name TEXT NOT NULL,
    barcode TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE UNIQUE INDEX IF NOT EXISTS ux_archive_file_barcode ON archive_file(barcode);
CREATE UNIQUE INDEX IF NOT EXISTS ux_archive_file_key
    ON archive_file(client_id, land_id, file_name);

CREATE TABLE IF NOT EXISTS import_run (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    import_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    original_filename TEXT,
    skip_errors INTEGER NOT NULL DEFAULT 1,
    update_existing INTEGER NOT NULL DEFAULT 0,
    total_rows INTEGER NOT NULL DEFAULT 0,
    processed_rows INTEGER NOT NULL DEFAULT 0,
    success_rows INTEGER NOT NULL DEFAULT 0,
    failed_rows INTEGER NOT NULL DEFAULT 0,
    errors TEXT NOT NULL DEFAULT '[]',
    general_error TEXT,
    summary TEXT,
    started_at TEXT,
    completed_at TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_import_run_created ON import_run(created_at);

CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
    VALUES ('global', 'GLOBAL', 'global');

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id),
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
