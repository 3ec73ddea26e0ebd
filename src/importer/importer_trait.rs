// ==========================================
// 档案批量导入引擎 - 导入器 Trait
// ==========================================
// 职责: 定义档案导入接口（不包含实现）
// 实现者: api::ImportApi
// ==========================================

use crate::domain::import_run::{ImportOptions, RunReport};
use crate::domain::types::ImportType;
use crate::importer::error::ImportResult;
use async_trait::async_trait;
use std::path::PathBuf;

// ==========================================
// ArchiveImporter Trait
// ==========================================
#[async_trait]
pub trait ArchiveImporter: Send + Sync {
    /// 导入单个表格文件并等待运行结束
    ///
    /// # 返回
    /// - Ok(RunReport): 运行终态（completed 或 failed；行错误/源文件错误都在报告中）
    /// - Err: 运行记录无法创建或后台任务异常
    ///
    /// # 导入流程
    /// 1. 创建运行记录（pending → validating）
    /// 2. 读取全部工作表（源文件错误 → failed）
    /// 3. 表头标准化 + 行映射 + 合并单元格补全
    /// 4. 分块落库（一个块一个事务）
    /// 5. 写入终态与汇总
    async fn import_file(
        &self,
        file_path: PathBuf,
        import_type: ImportType,
        options: ImportOptions,
    ) -> ImportResult<RunReport>;

    /// 批量导入多个文件（并发执行，各自独立的运行记录）
    ///
    /// 某个文件失败不影响其他文件；返回顺序与输入顺序一致
    async fn batch_import(
        &self,
        file_paths: Vec<PathBuf>,
        import_type: ImportType,
        options: ImportOptions,
    ) -> Vec<ImportResult<RunReport>>;
}
