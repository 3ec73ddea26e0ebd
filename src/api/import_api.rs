// ==========================================
// 档案批量导入API
// ==========================================
// 职责: 创建运行记录 → 后台执行导入 → 进度轮询 / 取消 / 运行记录管理
// 线程: 每个运行在独立的阻塞线程上执行，使用独立的数据库连接
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ImportSettings};
use crate::domain::import_run::{ImportOptions, ImportRun, RunProgress, RunReport};
use crate::domain::types::ImportType;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::template_headers;
use crate::importer::file_parser::open_source;
use crate::importer::import_engine::ImportEngine;
use crate::importer::importer_trait::ArchiveImporter;
use crate::repository::{ImportRunRepository, SqliteImportStore};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 运行列表默认条数
pub const DEFAULT_LIST_LIMIT: usize = 50;

type TokenMap = Arc<Mutex<HashMap<i64, CancellationToken>>>;

/// 已启动的后台运行
pub struct LaunchedRun {
    pub run_id: i64,
    handle: JoinHandle<ImportResult<RunReport>>,
}

impl LaunchedRun {
    /// 等待运行结束
    pub async fn wait(self) -> ImportResult<RunReport> {
        self.handle
            .await
            .map_err(|e| ImportError::InternalError(format!("导入任务异常退出: {}", e)))?
    }
}

/// 导入API
pub struct ImportApi {
    db_path: String,
    runs: ImportRunRepository,
    config: ConfigManager,
    tokens: TokenMap,
}

impl ImportApi {
    /// 创建新的ImportApi实例（初始化数据库结构）
    pub fn new(db_path: &str) -> ApiResult<Self> {
        let runs = ImportRunRepository::new(db_path)?;
        let config = ConfigManager::new(db_path)?;

        Ok(Self {
            db_path: db_path.to_string(),
            runs,
            config,
            tokens: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    /// 启动导入（立即返回，运行在后台执行）
    ///
    /// # 返回
    /// - Ok(LaunchedRun): run_id 可用于进度轮询与取消
    /// - Err(ApiError): 运行记录无法创建
    pub async fn start_import(
        &self,
        file_path: impl Into<PathBuf>,
        import_type: ImportType,
        options: ImportOptions,
    ) -> ApiResult<LaunchedRun> {
        Ok(self.launch(file_path.into(), import_type, options).await?)
    }

    /// 导入并等待运行结束
    pub async fn run_import(
        &self,
        file_path: impl Into<PathBuf>,
        import_type: ImportType,
        options: ImportOptions,
    ) -> ApiResult<RunReport> {
        Ok(self.import_file(file_path.into(), import_type, options).await?)
    }

    /// 查询运行进度（仅反映已提交的块）
    pub fn get_progress(&self, run_id: i64) -> ApiResult<RunProgress> {
        let run = self.get_run(run_id)?;
        Ok(RunProgress::from(&run))
    }

    /// 查询运行记录（含行错误与汇总）
    pub fn get_run(&self, run_id: i64) -> ApiResult<ImportRun> {
        self.runs
            .get_run(run_id)?
            .ok_or_else(|| ApiError::NotFound(format!("import_run(id={})不存在", run_id)))
    }

    /// 请求取消运行（在下一个块开始前生效）
    ///
    /// # 返回
    /// - true: 运行仍在执行，已发出取消信号
    /// - false: 运行已结束或不属于本实例
    pub fn cancel_import(&self, run_id: i64) -> ApiResult<bool> {
        let tokens = self
            .tokens
            .lock()
            .map_err(|e| ApiError::InternalError(format!("锁获取失败: {}", e)))?;

        match tokens.get(&run_id) {
            Some(token) => {
                info!(run_id, "请求取消导入");
                token.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 列出最近的运行（新 → 旧）
    pub fn list_runs(&self, limit: Option<usize>) -> ApiResult<Vec<ImportRun>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);
        Ok(self.runs.list_runs(limit)?)
    }

    /// 删除运行记录（pending/validating/processing 拒绝删除）
    pub fn delete_run(&self, run_id: i64) -> ApiResult<()> {
        Ok(self.runs.delete_run(run_id)?)
    }

    /// 导入模板表头
    pub fn template_headers(import_type: ImportType) -> Vec<String> {
        template_headers(import_type)
            .iter()
            .map(|h| h.to_string())
            .collect()
    }

    async fn launch(
        &self,
        file_path: PathBuf,
        import_type: ImportType,
        options: ImportOptions,
    ) -> ImportResult<LaunchedRun> {
        let original_filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());

        let run_id = self
            .runs
            .create_run(import_type, original_filename.as_deref(), options)?;
        self.runs.mark_validating(run_id)?;

        let settings = match ImportSettings::load(&self.config).await {
            Ok(settings) => settings,
            Err(e) => {
                self.runs.fail_run(run_id, &e.to_string())?;
                return Err(e.into());
            }
        };

        let cancel = CancellationToken::new();
        self.tokens
            .lock()
            .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?
            .insert(run_id, cancel.clone());

        info!(
            run_id,
            import_type = %import_type,
            file = %file_path.display(),
            "导入运行已启动"
        );

        let db_path = self.db_path.clone();
        let tokens = Arc::clone(&self.tokens);
        let handle = tokio::task::spawn_blocking(move || {
            let result = execute_run(
                &db_path,
                run_id,
                &file_path,
                import_type,
                options,
                settings,
                cancel,
            );

            if let Ok(mut tokens) = tokens.lock() {
                tokens.remove(&run_id);
            }

            if let Err(e) = &result {
                error!(run_id, error = %e, "导入运行未能进入引擎");
                let marked = ImportRunRepository::new(&db_path)
                    .and_then(|repo| repo.fail_run(run_id, &e.to_string()));
                if let Err(mark_err) = marked {
                    warn!(run_id, error = %mark_err, "运行失败状态写入失败");
                }
            }
            result
        });

        Ok(LaunchedRun { run_id, handle })
    }
}

/// 在阻塞线程上执行一次运行（独立连接）
fn execute_run(
    db_path: &str,
    run_id: i64,
    file_path: &Path,
    import_type: ImportType,
    options: ImportOptions,
    settings: ImportSettings,
    cancel: CancellationToken,
) -> ImportResult<RunReport> {
    let store = SqliteImportStore::new(db_path)?;
    let mut source = open_source(file_path)?;

    let mut engine = ImportEngine::new(store, settings).with_cancellation(cancel);
    engine.run(run_id, import_type, options, source.as_mut())
}

#[async_trait]
impl ArchiveImporter for ImportApi {
    async fn import_file(
        &self,
        file_path: PathBuf,
        import_type: ImportType,
        options: ImportOptions,
    ) -> ImportResult<RunReport> {
        let launched = self.launch(file_path, import_type, options).await?;
        launched.wait().await
    }

    async fn batch_import(
        &self,
        file_paths: Vec<PathBuf>,
        import_type: ImportType,
        options: ImportOptions,
    ) -> Vec<ImportResult<RunReport>> {
        info!(files = file_paths.len(), import_type = %import_type, "批量导入开始");
        join_all(
            file_paths
                .into_iter()
                .map(|path| self.import_file(path, import_type, options)),
        )
        .await
    }
}
