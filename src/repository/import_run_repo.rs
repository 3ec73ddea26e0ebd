// ==========================================
// 档案批量导入引擎 - 导入运行记录仓储
// ==========================================
// 职责: 运行记录的创建 / 查询 / 列表 / 删除（供轮询与运维使用）
// 说明: 运行中的进度与终态由 ImportStore 在运行自己的连接上写入
// 红线: 活动中的运行（pending / validating / processing）不可删除
// ==========================================

use crate::db::open_and_init;
use crate::domain::import_run::{ImportOptions, ImportRun, RowError, RunCounters, RunSummary};
use crate::domain::types::{ImportStatus, ImportType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const RUN_COLUMNS: &str = "id, import_type, status, original_filename, skip_errors, \
     update_existing, total_rows, processed_rows, success_rows, failed_rows, errors, \
     general_error, summary, started_at, completed_at, created_at";

// ==========================================
// ImportRunRepository
// ==========================================
pub struct ImportRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportRunRepository {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_and_init(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 使用共享连接创建实例
    pub fn new_with_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建运行记录（status = pending）
    pub fn create_run(
        &self,
        import_type: ImportType,
        original_filename: Option<&str>,
        options: ImportOptions,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_run (
                import_type, status, original_filename, skip_errors, update_existing, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                import_type.as_str(),
                ImportStatus::Pending.as_str(),
                original_filename,
                options.skip_errors,
                options.update_existing,
                Utc::now(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// pending → validating（启动后台运行时）
    pub fn mark_validating(&self, run_id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE import_run SET status = ?2 WHERE id = ?1 AND status = ?3",
            params![
                run_id,
                ImportStatus::Validating.as_str(),
                ImportStatus::Pending.as_str()
            ],
        )?;

        if affected == 0 {
            let current = self.status_locked(&conn, run_id)?;
            return Err(RepositoryError::InvalidStateTransition {
                from: current.to_string(),
                to: ImportStatus::Validating.to_string(),
            });
        }
        Ok(())
    }

    /// 运行在引擎接管前失败（例如无法打开数据库）
    pub fn fail_run(&self, run_id: i64, message: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE import_run SET status = ?2, general_error = ?3, completed_at = ?4
            WHERE id = ?1
            "#,
            params![run_id, ImportStatus::Failed.as_str(), message, Utc::now()],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: i64) -> RepositoryResult<Option<ImportRun>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM import_run WHERE id = ?1", RUN_COLUMNS);
        Ok(conn.query_row(&sql, [run_id], run_from_row).optional()?)
    }

    /// 列出最近的运行（新 → 旧）
    pub fn list_runs(&self, limit: usize) -> RepositoryResult<Vec<ImportRun>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM import_run ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map([limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// 删除运行记录（活动中的运行拒绝删除）
    pub fn delete_run(&self, run_id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let status = self.status_locked(&conn, run_id)?;

        if status.is_active() {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "运行 {} 处于 {} 状态，不可删除",
                run_id, status
            )));
        }

        conn.execute("DELETE FROM import_run WHERE id = ?1", [run_id])?;
        Ok(())
    }

    fn status_locked(&self, conn: &Connection, run_id: i64) -> RepositoryResult<ImportStatus> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT status FROM import_run WHERE id = ?1",
                [run_id],
                |row| row.get(0),
            )
            .optional()?;

        let raw = raw.ok_or_else(|| RepositoryError::NotFound {
            entity: "import_run".to_string(),
            id: run_id.to_string(),
        })?;

        raw.parse::<ImportStatus>()
            .map_err(|message| RepositoryError::FieldValueError {
                field: "status".to_string(),
                message,
            })
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e.to_string())))
        .transpose()
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<ImportRun> {
    let import_type: String = row.get(1)?;
    let status: String = row.get(2)?;

    let counter =
        |idx: usize| -> rusqlite::Result<usize> { Ok(row.get::<_, i64>(idx)?.max(0) as usize) };

    Ok(ImportRun {
        id: row.get(0)?,
        import_type: import_type
            .parse::<ImportType>()
            .map_err(|e| conversion_error(1, e))?,
        status: status
            .parse::<ImportStatus>()
            .map_err(|e| conversion_error(2, e))?,
        original_filename: row.get(3)?,
        options: ImportOptions {
            skip_errors: row.get(4)?,
            update_existing: row.get(5)?,
        },
        counters: RunCounters {
            total_rows: counter(6)?,
            processed_rows: counter(7)?,
            success_rows: counter(8)?,
            failed_rows: counter(9)?,
        },
        errors: json_column::<Vec<RowError>>(row, 10)?.unwrap_or_default(),
        general_error: row.get(11)?,
        summary: json_column::<RunSummary>(row, 12)?,
        started_at: row.get(13)?,
        completed_at: row.get(14)?,
        created_at: row.get(15)?,
    })
}
