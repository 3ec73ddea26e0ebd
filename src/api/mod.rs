// ==========================================
// 档案批量导入引擎 - API 层
// ==========================================
// 职责: 提供异步导入接口（启动 / 进度 / 取消 / 运行记录管理）
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::{ImportApi, LaunchedRun};
