// ==========================================
// 档案批量导入引擎 - 导入运行记录模型
// ==========================================
// 职责: 运行记录 / 运行选项 / 行错误 / 汇总
// 所有权: 仅由批次与进度控制器修改（周期检查点 + 最终写入）
// ==========================================

use crate::domain::types::{ImportStatus, ImportType, NodeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 行错误中保留的输入字段数上限
pub const ROW_ERROR_FIELD_LIMIT: usize = 5;

// ==========================================
// ImportOptions - 运行选项
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// 行失败后继续（默认 true）
    pub skip_errors: bool,
    /// 合并到已有客户/土地（默认 false）
    pub update_existing: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            skip_errors: true,
            update_existing: false,
        }
    }
}

// ==========================================
// RowError - 单行错误（供错误复核界面读取）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub sheet: String,
    pub row_number: usize,
    /// 前若干个输入字段 (规范键, 值)
    pub data: Vec<(String, String)>,
    pub message: String,
}

// ==========================================
// RunCounters - 进度计数
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub total_rows: usize,
    pub processed_rows: usize,
    pub success_rows: usize,
    pub failed_rows: usize,
}

impl RunCounters {
    /// 进度百分比（总数为 0 时视为 100）
    pub fn percentage(&self) -> u8 {
        if self.total_rows == 0 {
            return 100;
        }
        let pct = self.processed_rows.saturating_mul(100) / self.total_rows;
        pct.min(100) as u8
    }
}

// ==========================================
// RunSummary - 最终汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub sheets: usize,
    /// 本次运行新建的实体数量（按种类）
    pub created: BTreeMap<String, usize>,
    pub files_created: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn created_of(&self, kind: NodeKind) -> usize {
        self.created.get(kind.table()).copied().unwrap_or(0)
    }
}

// ==========================================
// ImportRun - 导入运行记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: i64,
    pub import_type: ImportType,
    pub status: ImportStatus,
    pub original_filename: Option<String>,
    pub options: ImportOptions,
    pub counters: RunCounters,
    /// 行错误（最多保留 error_cap 条）
    pub errors: Vec<RowError>,
    /// 整体错误（源文件不可读、取消等）
    pub general_error: Option<String>,
    pub summary: Option<RunSummary>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// RunReport - 运行终态报告（引擎返回值）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: i64,
    pub status: ImportStatus,
    pub counters: RunCounters,
    pub errors: Vec<RowError>,
    pub general_error: Option<String>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.status == ImportStatus::Completed
    }
}

// ==========================================
// RunProgress - 轮询进度
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProgress {
    pub run_id: i64,
    pub status: ImportStatus,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub success_rows: usize,
    pub failed_rows: usize,
    pub progress_percentage: u8,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&ImportRun> for RunProgress {
    fn from(run: &ImportRun) -> Self {
        Self {
            run_id: run.id,
            status: run.status,
            total_rows: run.counters.total_rows,
            processed_rows: run.counters.processed_rows,
            success_rows: run.counters.success_rows,
            failed_rows: run.counters.failed_rows,
            progress_percentage: run.counters.percentage(),
            completed_at: run.completed_at,
        }
    }
}
