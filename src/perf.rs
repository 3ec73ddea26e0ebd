// ==========================================
// 档案批量导入引擎 - 运行性能统计
// ==========================================
// 慢 SQL: 运行连接上的 profile 回调，超过阈值输出 slow_sql 日志
// 运行统计: RunPerf 累计块数 / 行数 / SQL 数，运行结束时输出一条 perf 日志
// SQL 计数为线程局部: 一个运行在一个阻塞线程上顺序执行
// ==========================================

use crate::domain::types::ImportType;
use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub const ENV_PERF_SQL: &str = "ARCHIVE_IMPORT_PERF_SQL";
pub const ENV_SLOW_SQL_MS: &str = "ARCHIVE_IMPORT_SLOW_SQL_MS";

const DEFAULT_SLOW_SQL_MS: u64 = 200;
const SQL_PREVIEW_CHARS: usize = 300;

/// 0 表示不记录慢 SQL
static SLOW_SQL_MS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static SQL_COUNTERS: Cell<SqlCounters> = const { Cell::new(SqlCounters::ZERO) };
}

/// 当前线程执行过的 SQL 语句数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlCounters {
    pub statements: u64,
    pub slow: u64,
}

impl SqlCounters {
    const ZERO: SqlCounters = SqlCounters {
        statements: 0,
        slow: 0,
    };

    fn current() -> Self {
        SQL_COUNTERS.with(Cell::get)
    }

    fn since(self, start: SqlCounters) -> SqlCounters {
        SqlCounters {
            statements: self.statements.saturating_sub(start.statements),
            slow: self.slow.saturating_sub(start.slow),
        }
    }
}

fn bump(update: impl FnOnce(&mut SqlCounters)) {
    SQL_COUNTERS.with(|cell| {
        let mut counters = cell.get();
        update(&mut counters);
        cell.set(counters);
    });
}

/// 解析开关值（1 / true / yes / on）
fn switch_on(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// 慢 SQL 阈值（毫秒）；统计未开启时为 None
///
/// - `ARCHIVE_IMPORT_PERF_SQL=1` 开启（默认关闭）
/// - `ARCHIVE_IMPORT_SLOW_SQL_MS=200` 阈值（默认 200）
fn slow_sql_threshold() -> Option<u64> {
    let enabled = std::env::var(ENV_PERF_SQL)
        .map(|v| switch_on(&v))
        .unwrap_or(false);
    if !enabled {
        return None;
    }
    Some(
        std::env::var(ENV_SLOW_SQL_MS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_SLOW_SQL_MS),
    )
}

/// 为运行连接安装 SQL 计数与慢 SQL 回调
pub fn install_sqlite_tracing(conn: &mut Connection) {
    match slow_sql_threshold() {
        Some(ms) => {
            SLOW_SQL_MS.store(ms, Ordering::Relaxed);
            conn.trace(Some(count_statement));
            conn.profile(Some(check_slow_statement));
        }
        None => {
            conn.trace(None);
            conn.profile(None);
        }
    }
}

fn count_statement(_sql: &str) {
    bump(|c| c.statements = c.statements.saturating_add(1));
}

fn check_slow_statement(sql: &str, duration: Duration) {
    let threshold = SLOW_SQL_MS.load(Ordering::Relaxed);
    let ms = duration.as_millis() as u64;
    if threshold == 0 || ms < threshold {
        return;
    }

    bump(|c| c.slow = c.slow.saturating_add(1));
    tracing::warn!(
        target: "slow_sql",
        duration_ms = ms,
        sql = %sql_preview(sql),
        "慢 SQL"
    );
}

fn sql_preview(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SQL_PREVIEW_CHARS)
        .collect()
}

// ==========================================
// RunPerf
// ==========================================

/// 单次导入运行的性能统计，drop 时输出汇总
pub struct RunPerf {
    run_id: i64,
    import_type: ImportType,
    start: Instant,
    sql_at_start: SqlCounters,
    chunks: usize,
    rows: usize,
}

impl RunPerf {
    pub fn start(run_id: i64, import_type: ImportType) -> Self {
        Self {
            run_id,
            import_type,
            start: Instant::now(),
            sql_at_start: SqlCounters::current(),
            chunks: 0,
            rows: 0,
        }
    }

    /// 一个块处理完毕（无论提交与否）
    pub fn record_chunk(&mut self, rows: usize) {
        self.chunks += 1;
        self.rows += rows;
    }

    /// 运行开始以来的 SQL 计数（未开启统计时为 0）
    pub fn sql(&self) -> SqlCounters {
        SqlCounters::current().since(self.sql_at_start)
    }

    fn rows_per_sec(rows: usize, elapsed: Duration) -> u64 {
        let ms = elapsed.as_millis().max(1) as u64;
        (rows as u64).saturating_mul(1000) / ms
    }
}

impl Drop for RunPerf {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let sql = self.sql();
        tracing::info!(
            target: "perf",
            run_id = self.run_id,
            import_type = %self.import_type,
            chunks = self.chunks,
            rows = self.rows,
            elapsed_ms = elapsed.as_millis() as u64,
            rows_per_sec = Self::rows_per_sec(self.rows, elapsed),
            sql_count = sql.statements,
            slow_sql_count = sql.slow,
            "导入运行性能"
        );
    }
}
