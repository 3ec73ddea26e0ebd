// ==========================================
// 档案批量导入引擎 - SQLite 存储实现
// ==========================================
// 职责: 实现 ImportStore（使用 rusqlite）
// 约定:
// - 每个运行独占一个连接（块事务 BEGIN IMMEDIATE / COMMIT / ROLLBACK）
// - 块内每行一个保存点，失败行 ROLLBACK TO 撤销自身写入
// - "不存在则创建" = INSERT OR IGNORE + 按唯一键 SELECT
// 红线: 存储层不含业务规则，只做数据 CRUD
// ==========================================

mod rows;

use crate::db::{configure_sqlite_connection, init_schema, open_and_init};
use crate::domain::client::{generate_client_code, Client, ClientDraft};
use crate::domain::hierarchy::Node;
use crate::domain::import_run::RunCounters;
use crate::domain::land::{FileKey, Land, LandDraft, NewArchiveFile};
use crate::domain::types::{ImportStatus, NodeKind};
use crate::perf::install_sqlite_tracing;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_store::{ImportStore, Resolved, RunOutcome, StoreSnapshot};
use chrono::Utc;
use rows::{client_from_row, land_from_row, node_from_row, CLIENT_COLUMNS, LAND_COLUMNS};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

const ROW_SAVEPOINT: &str = "import_row";

// ==========================================
// SqliteImportStore
// ==========================================
pub struct SqliteImportStore {
    conn: Connection,
}

impl SqliteImportStore {
    /// 打开数据库文件（含建库）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let mut conn = open_and_init(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        install_sqlite_tracing(&mut conn);
        Ok(Self { conn })
    }

    /// 使用已有连接（应用统一 PRAGMA + 建库）
    pub fn from_connection(conn: Connection) -> RepositoryResult<Self> {
        configure_sqlite_connection(&conn)?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn client_by(&self, clause: &str, value: &dyn rusqlite::ToSql) -> RepositoryResult<Client> {
        let sql = format!("SELECT {} FROM client WHERE {} = ?1", CLIENT_COLUMNS, clause);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        Ok(stmt.query_row(params![value], client_from_row)?)
    }

    fn land_by_id(&self, id: i64) -> RepositoryResult<Land> {
        let sql = format!("SELECT {} FROM land WHERE id = ?1", LAND_COLUMNS);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        Ok(stmt.query_row([id], land_from_row)?)
    }
}

impl ImportStore for SqliteImportStore {
    // ===== 预加载 =====

    fn load_snapshot(&self) -> RepositoryResult<StoreSnapshot> {
        let mut snapshot = StoreSnapshot::default();

        for kind in NodeKind::ALL {
            let sql = format!("SELECT id, parent_id, name FROM {}", kind.table());
            let mut stmt = self.conn.prepare(&sql)?;
            let nodes = stmt
                .query_map([], |row| node_from_row(kind, row))?
                .collect::<Result<Vec<_>, _>>()?;
            snapshot.nodes.extend(nodes);
        }

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM client", CLIENT_COLUMNS))?;
        snapshot.clients = stmt
            .query_map([], client_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM land", LAND_COLUMNS))?;
        snapshot.lands = stmt
            .query_map([], land_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            nodes = snapshot.nodes.len(),
            clients = snapshot.clients.len(),
            lands = snapshot.lands.len(),
            "预加载快照完成"
        );
        Ok(snapshot)
    }

    // ===== 块级事务 =====

    fn begin_chunk(&self) -> RepositoryResult<()> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    fn commit_chunk(&self) -> RepositoryResult<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    fn rollback_chunk(&self) -> RepositoryResult<()> {
        // 无活动事务时（例如 COMMIT 失败后已自动回滚）直接返回
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    // ===== 行级保存点 =====

    fn begin_row(&self) -> RepositoryResult<()> {
        self.conn
            .execute_batch(&format!("SAVEPOINT {}", ROW_SAVEPOINT))
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    fn release_row(&self) -> RepositoryResult<()> {
        self.conn
            .execute_batch(&format!("RELEASE {}", ROW_SAVEPOINT))
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    fn rollback_row(&self) -> RepositoryResult<()> {
        // ROLLBACK TO 保留保存点，需再 RELEASE 出栈
        self.conn
            .execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", ROW_SAVEPOINT))
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    // ===== 不存在则创建 =====

    fn get_or_create_node(
        &self,
        kind: NodeKind,
        parent_id: Option<i64>,
        name: &str,
    ) -> RepositoryResult<Resolved<Node>> {
        let table = kind.table();

        let inserted = self
            .conn
            .prepare_cached(&format!(
                "INSERT OR IGNORE INTO {} (parent_id, name) VALUES (?1, ?2)",
                table
            ))?
            .execute(params![parent_id, name])?;

        let node = self
            .conn
            .prepare_cached(&format!(
                "SELECT id, parent_id, name FROM {} \
                 WHERE IFNULL(parent_id, 0) = IFNULL(?1, 0) AND name = ?2",
                table
            ))?
            .query_row(params![parent_id, name], |row| node_from_row(kind, row))?;

        Ok((node, inserted > 0))
    }

    fn get_or_create_client(&self, draft: &ClientDraft) -> RepositoryResult<Resolved<Client>> {
        let client_code = draft
            .client_code
            .clone()
            .unwrap_or_else(generate_client_code);

        let inserted = self
            .conn
            .prepare_cached(
                r#"
                INSERT OR IGNORE INTO client (
                    name, national_id, client_code, telephone, mobile, notes,
                    excel_row_number, files_code
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '[]')
                "#,
            )?
            .execute(params![
                draft.name,
                draft.national_id,
                client_code,
                draft.telephone,
                draft.mobile,
                draft.notes,
                draft.excel_row_number,
            ])?;

        let client = self.client_by("name", &draft.name)?;
        Ok((client, inserted > 0))
    }

    fn update_client(&self, id: i64, draft: &ClientDraft) -> RepositoryResult<Client> {
        let affected = self
            .conn
            .prepare_cached(
                r#"
                UPDATE client SET
                    national_id = COALESCE(?2, national_id),
                    client_code = COALESCE(?3, client_code),
                    telephone = COALESCE(?4, telephone),
                    mobile = COALESCE(?5, mobile),
                    notes = COALESCE(?6, notes),
                    updated_at = datetime('now')
                WHERE id = ?1
                "#,
            )?
            .execute(params![
                id,
                draft.national_id,
                draft.client_code,
                draft.telephone,
                draft.mobile,
                draft.notes,
            ])?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "client".to_string(),
                id: id.to_string(),
            });
        }
        self.client_by("id", &id)
    }

    fn set_client_files_code(&self, id: i64, files_code: &[String]) -> RepositoryResult<()> {
        let json = serde_json::to_string(files_code)?;
        self.conn
            .prepare_cached(
                "UPDATE client SET files_code = ?2, updated_at = datetime('now') WHERE id = ?1",
            )?
            .execute(params![id, json])?;
        Ok(())
    }

    fn get_or_create_land(&self, draft: &LandDraft) -> RepositoryResult<Resolved<Land>> {
        let loc = &draft.location;

        let inserted = self
            .conn
            .prepare_cached(
                r#"
                INSERT OR IGNORE INTO land (
                    client_id, land_no, unit_no, governorate_id, city_id, district_id,
                    zone_id, area_id, room_id, lane_id, stand_id, rack_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )?
            .execute(params![
                draft.client_id,
                draft.land_no,
                draft.unit_no,
                loc.governorate_id,
                loc.city_id,
                loc.district_id,
                loc.zone_id,
                loc.area_id,
                loc.room_id,
                loc.lane_id,
                loc.stand_id,
                loc.rack_id,
            ])?;

        let key = draft.key();
        let land = self
            .conn
            .prepare_cached(&format!(
                "SELECT {} FROM land \
                 WHERE client_id = ?1 AND land_no = ?2 AND IFNULL(governorate_id, 0) = ?3",
                LAND_COLUMNS
            ))?
            .query_row(
                params![key.client_id, key.land_no, key.governorate_id],
                land_from_row,
            )?;

        Ok((land, inserted > 0))
    }

    fn update_land(&self, id: i64, draft: &LandDraft) -> RepositoryResult<Land> {
        let loc = &draft.location;

        let affected = self
            .conn
            .prepare_cached(
                r#"
                UPDATE land SET
                    unit_no = COALESCE(?2, unit_no),
                    city_id = COALESCE(?3, city_id),
                    district_id = COALESCE(?4, district_id),
                    zone_id = COALESCE(?5, zone_id),
                    area_id = COALESCE(?6, area_id),
                    room_id = COALESCE(?7, room_id),
                    lane_id = COALESCE(?8, lane_id),
                    stand_id = COALESCE(?9, stand_id),
                    rack_id = COALESCE(?10, rack_id),
                    updated_at = datetime('now')
                WHERE id = ?1
                "#,
            )?
            .execute(params![
                id,
                draft.unit_no,
                loc.city_id,
                loc.district_id,
                loc.zone_id,
                loc.area_id,
                loc.room_id,
                loc.lane_id,
                loc.stand_id,
                loc.rack_id,
            ])?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "land".to_string(),
                id: id.to_string(),
            });
        }
        self.land_by_id(id)
    }

    // ===== 文件 =====

    fn file_exists(&self, key: &FileKey) -> RepositoryResult<bool> {
        let found = self
            .conn
            .prepare_cached(
                "SELECT 1 FROM archive_file \
                 WHERE client_id = ?1 AND land_id = ?2 AND file_name = ?3 LIMIT 1",
            )?
            .query_row(params![key.client_id, key.land_id, key.file_name], |_| {
                Ok(true)
            })
            .optional()?;
        Ok(found.unwrap_or(false))
    }

    fn bulk_insert_files(&self, files: &[NewArchiveFile]) -> RepositoryResult<usize> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            INSERT OR IGNORE INTO archive_file (
                client_id, land_id, room_id, lane_id, stand_id, rack_id,
                file_name, barcode, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )?;

        let mut count = 0;
        for file in files {
            count += stmt.execute(params![
                file.client_id,
                file.land_id,
                file.room_id,
                file.lane_id,
                file.stand_id,
                file.rack_id,
                file.file_name,
                file.barcode,
                file.status,
            ])?;
        }
        Ok(count)
    }

    // ===== 运行记录 =====

    fn mark_run_processing(&self, run_id: i64) -> RepositoryResult<()> {
        let affected = self.conn.execute(
            "UPDATE import_run SET status = ?2, started_at = ?3 WHERE id = ?1",
            params![run_id, ImportStatus::Processing.as_str(), Utc::now()],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "import_run".to_string(),
                id: run_id.to_string(),
            });
        }
        Ok(())
    }

    fn save_checkpoint(&self, run_id: i64, counters: &RunCounters) -> RepositoryResult<()> {
        self.conn.execute(
            r#"
            UPDATE import_run SET
                total_rows = ?2, processed_rows = ?3, success_rows = ?4, failed_rows = ?5
            WHERE id = ?1
            "#,
            params![
                run_id,
                counters.total_rows as i64,
                counters.processed_rows as i64,
                counters.success_rows as i64,
                counters.failed_rows as i64,
            ],
        )?;
        Ok(())
    }

    fn finish_run(&self, run_id: i64, outcome: &RunOutcome<'_>) -> RepositoryResult<()> {
        let errors_json = serde_json::to_string(outcome.errors)?;
        let summary_json = serde_json::to_string(outcome.summary)?;
        let counters = &outcome.counters;

        self.conn.execute(
            r#"
            UPDATE import_run SET
                status = ?2,
                total_rows = ?3, processed_rows = ?4, success_rows = ?5, failed_rows = ?6,
                errors = ?7, general_error = ?8, summary = ?9, completed_at = ?10
            WHERE id = ?1
            "#,
            params![
                run_id,
                outcome.status.as_str(),
                counters.total_rows as i64,
                counters.processed_rows as i64,
                counters.success_rows as i64,
                counters.failed_rows as i64,
                errors_json,
                outcome.general_error,
                summary_json,
                Utc::now(),
            ],
        )?;
        Ok(())
    }
}
