// ==========================================
// 档案批量导入引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入引擎所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取，缺省回落内置默认值）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 批次与进度 =====

    /// 每个事务块的行数
    ///
    /// # 默认值
    /// - 500
    async fn get_chunk_size(&self) -> RepositoryResult<usize>;

    /// 保留的行错误上限
    ///
    /// # 默认值
    /// - 100
    async fn get_error_cap(&self) -> RepositoryResult<usize>;

    /// 进度检查点间隔（行）
    ///
    /// # 默认值
    /// - 2500
    async fn get_progress_interval(&self) -> RepositoryResult<usize>;

    /// 文件记录批量插入阈值
    ///
    /// # 默认值
    /// - 100
    async fn get_file_batch_size(&self) -> RepositoryResult<usize>;

    // ===== 解析 =====

    /// 土地编号范围展开上限
    ///
    /// # 默认值
    /// - 1000
    async fn get_max_land_range(&self) -> RepositoryResult<u64>;

    // ===== 缺省值 =====

    async fn get_default_governorate(&self) -> RepositoryResult<String>;

    async fn get_default_city(&self) -> RepositoryResult<String>;

    /// 档案导入中业主名缺失时的占位名
    async fn get_unnamed_owner(&self) -> RepositoryResult<String>;

    /// 档案导入中文件名缺失时的占位名
    async fn get_missing_file_name(&self) -> RepositoryResult<String>;
}
