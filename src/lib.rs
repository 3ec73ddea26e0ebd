// ==========================================
// 档案批量导入引擎 - 核心库
// ==========================================
// 职责: 表格（Excel/CSV）→ 层级地理/物理位置 + 客户 + 土地 + 档案文件
// 技术栈: Rust + SQLite
// 原则: 按块事务落库，可重复导入（幂等），进度可轮询
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 表格解析与实体归并
pub mod importer;

// 配置层 - 导入参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/表结构）
pub mod db;

// 日志系统
pub mod logging;

// 运行性能统计
pub mod perf;

// API 层 - 异步导入接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ImportStatus, ImportType, NodeKind};

// 领域实体
pub use domain::{
    ArchiveFile, Client, ImportOptions, ImportRun, Land, Node, RowError, RunProgress, RunReport,
    RunSummary,
};

// 导入引擎
pub use importer::{ArchiveImporter, ImportEngine, ImportError, ImportResult};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "档案批量导入引擎";
