// ==========================================
// 档案批量导入引擎 - 持久化存储 Trait
// ==========================================
// 职责: 导入引擎消费的存储能力
// - 按唯一键"不存在则创建"（各实体种类）
// - 文件记录批量插入
// - 块级事务边界 + 行级保存点
// - 运行记录读写
// 红线: 存储层不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::client::{Client, ClientDraft};
use crate::domain::hierarchy::Node;
use crate::domain::import_run::{RowError, RunCounters, RunSummary};
use crate::domain::land::{FileKey, Land, LandDraft, NewArchiveFile};
use crate::domain::types::{ImportStatus, NodeKind};
use crate::repository::error::RepositoryResult;

/// 预加载快照（运行开始前一次性读取）
#[derive(Debug, Default, Clone)]
pub struct StoreSnapshot {
    pub nodes: Vec<Node>,
    pub clients: Vec<Client>,
    pub lands: Vec<Land>,
}

/// get-or-create 结果: (实体, 是否本次新建)
pub type Resolved<T> = (T, bool);

/// 运行终态写入
#[derive(Debug, Clone)]
pub struct RunOutcome<'a> {
    pub status: ImportStatus,
    pub counters: RunCounters,
    pub errors: &'a [RowError],
    pub general_error: Option<&'a str>,
    pub summary: &'a RunSummary,
}

// ==========================================
// ImportStore Trait
// ==========================================
// 用途: 导入引擎的持久化接缝（同步，运行于阻塞线程）
// 实现者: SqliteImportStore
pub trait ImportStore: Send {
    // ===== 预加载 =====

    /// 读取全部层级节点 / 客户 / 土地
    fn load_snapshot(&self) -> RepositoryResult<StoreSnapshot>;

    // ===== 块级事务 =====

    fn begin_chunk(&self) -> RepositoryResult<()>;
    fn commit_chunk(&self) -> RepositoryResult<()>;
    fn rollback_chunk(&self) -> RepositoryResult<()>;

    // ===== 行级保存点（块事务内） =====

    fn begin_row(&self) -> RepositoryResult<()>;
    fn release_row(&self) -> RepositoryResult<()>;

    /// 撤销本行写入，块内其他行不受影响
    fn rollback_row(&self) -> RepositoryResult<()>;

    // ===== 不存在则创建 =====

    /// 层级节点（键: kind + parent_id + name）
    fn get_or_create_node(
        &self,
        kind: NodeKind,
        parent_id: Option<i64>,
        name: &str,
    ) -> RepositoryResult<Resolved<Node>>;

    /// 客户（键: name）
    fn get_or_create_client(&self, draft: &ClientDraft) -> RepositoryResult<Resolved<Client>>;

    /// 合并非空属性到已有客户
    fn update_client(&self, id: i64, draft: &ClientDraft) -> RepositoryResult<Client>;

    /// 覆盖写入客户的文件编号列表
    fn set_client_files_code(&self, id: i64, files_code: &[String]) -> RepositoryResult<()>;

    /// 土地（键: client_id + land_no + governorate_id）
    fn get_or_create_land(&self, draft: &LandDraft) -> RepositoryResult<Resolved<Land>>;

    /// 合并非空位置 / 单元号到已有土地
    fn update_land(&self, id: i64, draft: &LandDraft) -> RepositoryResult<Land>;

    // ===== 文件 =====

    fn file_exists(&self, key: &FileKey) -> RepositoryResult<bool>;

    /// 批量插入文件（重复键忽略）
    ///
    /// # 返回
    /// - 实际插入条数
    fn bulk_insert_files(&self, files: &[NewArchiveFile]) -> RepositoryResult<usize>;

    // ===== 运行记录 =====

    fn mark_run_processing(&self, run_id: i64) -> RepositoryResult<()>;

    /// 进度检查点（仅在块提交后调用）
    fn save_checkpoint(&self, run_id: i64, counters: &RunCounters) -> RepositoryResult<()>;

    /// 写入终态 / 汇总 / 错误列表
    fn finish_run(&self, run_id: i64, outcome: &RunOutcome<'_>) -> RepositoryResult<()>;
}
