// ==========================================
// 档案批量导入引擎 - 数据仓储层
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化（表名仅来自封闭枚举 NodeKind）
// 红线: Repository 不含业务逻辑
// ==========================================

pub mod error;
pub mod import_run_repo;
pub mod import_store;
pub mod import_store_impl;

pub use error::{RepositoryError, RepositoryResult};
pub use import_run_repo::ImportRunRepository;
pub use import_store::{ImportStore, Resolved, RunOutcome, StoreSnapshot};
pub use import_store_impl::SqliteImportStore;
