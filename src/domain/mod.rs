// ==========================================
// 档案批量导入引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含导入流程逻辑
// ==========================================

pub mod client;
pub mod hierarchy;
pub mod import_run;
pub mod land;
pub mod types;

// 重导出核心类型
pub use client::{generate_client_code, Client, ClientDraft};
pub use hierarchy::{normalize_name, LocationPath, Node};
pub use import_run::{
    ImportOptions, ImportRun, RowError, RunCounters, RunProgress, RunReport, RunSummary,
    ROW_ERROR_FIELD_LIMIT,
};
pub use land::{
    generate_barcode, ArchiveFile, FileKey, Land, LandDraft, LandKey, NewArchiveFile,
    FILE_STATUS_PENDING,
};
pub use types::{ImportStatus, ImportType, NodeKind};
