// ==========================================
// 档案批量导入引擎 - 批次与进度控制器
// ==========================================
// 职责: 整合导入流程，从表格源到数据库
// 流程: 读取工作表 → 表头标准化 → 行映射/清洗 → 合并单元格补全（仅档案）
//       → 行处理 → 块提交 → 进度检查点 → 终态报告
// 事务: 一个块 = 一个事务；块内失败整块回滚，已提交块不受影响
// 取消: 块之间检查 CancellationToken
// ==========================================

use crate::config::import_settings::ImportSettings;
use crate::domain::import_run::{ImportOptions, RowError, RunCounters, RunReport, RunSummary};
use crate::domain::types::{ImportStatus, ImportType};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::{normalize_headers, FieldMapper};
use crate::importer::file_parser::{SheetData, SourceRow, SpreadsheetSource};
use crate::importer::merged_cells::MergedCellTracker;
use crate::importer::row_processor::RowProcessor;
use crate::perf::RunPerf;
use crate::repository::import_store::{ImportStore, RunOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// 块处理结果
enum ChunkOutcome {
    Committed,
    /// 严格模式下行失败或块提交失败，运行中止
    Aborted(String),
}

struct ChunkInput<'a> {
    sheet: &'a str,
    headers: &'a [String],
    rows: &'a [SourceRow],
    carry_forward: bool,
    unnamed_owner: Option<&'a str>,
    skip_errors: bool,
}

// ==========================================
// ImportEngine
// ==========================================
pub struct ImportEngine<S: ImportStore> {
    store: S,
    settings: ImportSettings,
    cancel: CancellationToken,
}

/// 单次运行的可变状态
struct RunState {
    run_id: i64,
    options: ImportOptions,
    counters: RunCounters,
    errors: Vec<RowError>,
    last_checkpoint: usize,
    sheets_processed: usize,
}

impl<S: ImportStore> ImportEngine<S> {
    pub fn new(store: S, settings: ImportSettings) -> Self {
        Self {
            store,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// 执行一次导入运行
    ///
    /// # 返回
    /// - Ok(RunReport): 运行已结束（completed 或 failed），终态已写入运行记录
    /// - Err: 运行记录本身无法读写（存储不可用）
    #[instrument(skip(self, source), fields(input = %source.describe()))]
    pub fn run(
        &mut self,
        run_id: i64,
        import_type: ImportType,
        options: ImportOptions,
        source: &mut dyn SpreadsheetSource,
    ) -> ImportResult<RunReport> {
        let mut perf = RunPerf::start(run_id, import_type);
        info!(run_id, import_type = %import_type, ?options, "开始导入运行");

        self.store.mark_run_processing(run_id)?;

        let mut state = RunState {
            run_id,
            options,
            counters: RunCounters::default(),
            errors: Vec::new(),
            last_checkpoint: 0,
            sheets_processed: 0,
        };
        let mut processor = RowProcessor::new(import_type, options, self.settings.clone());

        // 步骤 1: 读取源文件（失败 → 整个运行失败，不产生任何实体）
        let sheets = match source.sheets() {
            Ok(sheets) => sheets,
            Err(e) => {
                error!(run_id, error = %e, "源文件读取失败");
                return self.finish(&mut state, &mut processor, Some(e.to_string()), false);
            }
        };

        state.counters.total_rows = sheets.iter().map(SheetData::row_count).sum();
        info!(
            run_id,
            sheets = sheets.len(),
            total_rows = state.counters.total_rows,
            "源文件读取完成"
        );
        self.checkpoint(&mut state);

        // 步骤 2: 预加载实体缓存
        if let Err(e) = processor.preload(&self.store) {
            error!(run_id, error = %e, "实体缓存预加载失败");
            return self.finish(&mut state, &mut processor, Some(e.to_string()), false);
        }

        // 步骤 3: 逐工作表、逐块处理
        let mut tracker = MergedCellTracker::new();
        let chunk_size = self.settings.chunk_size.max(1);

        for sheet in &sheets {
            tracker.reset();
            let headers = normalize_headers(&sheet.headers);
            debug!(
                run_id,
                sheet = %sheet.name,
                ?headers,
                rows = sheet.row_count(),
                "开始处理工作表"
            );

            for (chunk_index, chunk) in sheet.rows.chunks(chunk_size).enumerate() {
                if self.cancel.is_cancelled() {
                    warn!(run_id, sheet = %sheet.name, chunk = chunk_index, "导入已取消");
                    let message = ImportError::Cancelled.to_string();
                    return self.finish(&mut state, &mut processor, Some(message), true);
                }

                let outcome = self.process_chunk(
                    &mut state,
                    &mut processor,
                    &mut tracker,
                    &sheet.name,
                    &headers,
                    chunk,
                );
                perf.record_chunk(chunk.len());

                if let ChunkOutcome::Aborted(message) = outcome {
                    error!(
                        run_id,
                        sheet = %sheet.name,
                        chunk = chunk_index,
                        %message,
                        "块处理中止，运行失败"
                    );
                    return self.finish(&mut state, &mut processor, Some(message), false);
                }

                if state.counters.processed_rows - state.last_checkpoint
                    >= self.settings.progress_interval
                {
                    self.checkpoint(&mut state);
                }
            }

            state.sheets_processed += 1;
        }

        self.finish(&mut state, &mut processor, None, false)
    }

    /// 处理单个块（一个事务）
    fn process_chunk(
        &self,
        state: &mut RunState,
        processor: &mut RowProcessor,
        tracker: &mut MergedCellTracker,
        sheet: &str,
        headers: &[String],
        rows: &[SourceRow],
    ) -> ChunkOutcome {
        let store: &dyn ImportStore = &self.store;
        let unnamed_owner = processor
            .import_type()
            .defaults_owner_name()
            .then_some(self.settings.unnamed_owner.as_str());

        let carry_forward = processor.import_type().carries_forward();
        let mut success = 0usize;
        let mut row_errors = Vec::new();

        let chunk_result = self.write_chunk(
            processor,
            tracker,
            ChunkInput {
                sheet,
                headers,
                rows,
                carry_forward,
                unnamed_owner,
                skip_errors: state.options.skip_errors,
            },
            &mut success,
            &mut row_errors,
        );

        match chunk_result {
            Ok(()) => {
                processor.commit_chunk();
                state.counters.processed_rows += rows.len();
                state.counters.success_rows += success;
                state.counters.failed_rows += row_errors.len();
                push_capped(&mut state.errors, row_errors, self.settings.error_cap);
                ChunkOutcome::Committed
            }
            Err(e) => {
                if let Err(rollback_err) = store.rollback_chunk() {
                    warn!(run_id = state.run_id, error = %rollback_err, "块回滚失败");
                }
                processor.discard_chunk();

                let first_row = rows.first().map(|r| r.row_number).unwrap_or(0);

                if !state.options.skip_errors {
                    // 行失败已记录在 row_errors 中；块级失败补一条
                    if row_errors.is_empty() {
                        row_errors.push(chunk_error(sheet, first_row, &e));
                    }
                    let message = match row_errors.last() {
                        Some(last) => format!(
                            "工作表 {} 第 {} 行处理失败: {}",
                            last.sheet, last.row_number, last.message
                        ),
                        None => e.to_string(),
                    };
                    push_capped(&mut state.errors, row_errors, self.settings.error_cap);
                    return ChunkOutcome::Aborted(message);
                }

                // 跳过模式: 块提交失败 → 整块计为失败，记录一条错误
                warn!(
                    run_id = state.run_id,
                    sheet,
                    first_row,
                    error = %e,
                    "块提交失败，整块计为失败"
                );
                state.counters.processed_rows += rows.len();
                state.counters.failed_rows += rows.len();
                push_capped(
                    &mut state.errors,
                    vec![chunk_error(sheet, first_row, &e)],
                    self.settings.error_cap,
                );
                ChunkOutcome::Committed
            }
        }
    }

    /// 块事务: BEGIN → 逐行处理（每行一个保存点）→ 刷新文件缓冲 → COMMIT
    ///
    /// 失败行回到保存点，不留下任何写入；严格模式下首个行错误即返回（调用方回滚）
    /// 保存点本身失败按块级错误处理
    fn write_chunk(
        &self,
        processor: &mut RowProcessor,
        tracker: &mut MergedCellTracker,
        input: ChunkInput<'_>,
        success: &mut usize,
        row_errors: &mut Vec<RowError>,
    ) -> ImportResult<()> {
        let store: &dyn ImportStore = &self.store;
        store.begin_chunk()?;

        for source_row in input.rows {
            let mut row = FieldMapper.map_row(
                input.sheet,
                source_row.row_number,
                input.headers,
                &source_row.cells,
            );
            if input.carry_forward {
                tracker.apply(&mut row, input.unnamed_owner);
            }

            let mark = processor.mark_row();
            store.begin_row()?;
            if let Err(e) = processor.process(store, &row) {
                store.rollback_row()?;
                processor.undo_row(mark);
                debug!(sheet = input.sheet, row = row.row_number, error = %e, "行处理失败");
                row_errors.push(RowError {
                    sheet: input.sheet.to_string(),
                    row_number: row.row_number,
                    data: row.preview,
                    message: e.to_string(),
                });
                if !input.skip_errors {
                    return Err(e);
                }
                continue;
            }
            store.release_row()?;
            processor.flush_if_full(store)?;
            *success += 1;
        }

        processor.flush_files(store)?;
        store.commit_chunk()?;
        Ok(())
    }

    /// 进度检查点（仅反映已提交块）
    fn checkpoint(&self, state: &mut RunState) {
        match self.store.save_checkpoint(state.run_id, &state.counters) {
            Ok(()) => {
                state.last_checkpoint = state.counters.processed_rows;
                debug!(
                    run_id = state.run_id,
                    processed = state.counters.processed_rows,
                    total = state.counters.total_rows,
                    "进度检查点"
                );
            }
            Err(e) => warn!(run_id = state.run_id, error = %e, "进度检查点写入失败"),
        }
    }

    /// 写入终态并释放缓存
    fn finish(
        &self,
        state: &mut RunState,
        processor: &mut RowProcessor,
        general_error: Option<String>,
        cancelled: bool,
    ) -> ImportResult<RunReport> {
        let status = if general_error.is_some() {
            ImportStatus::Failed
        } else {
            ImportStatus::Completed
        };

        let summary = RunSummary {
            total: state.counters.total_rows,
            success: state.counters.success_rows,
            failed: state.counters.failed_rows,
            sheets: state.sheets_processed,
            created: processor.created_counts(),
            files_created: processor.files_created(),
            cancelled,
        };

        self.store.finish_run(
            state.run_id,
            &RunOutcome {
                status,
                counters: state.counters,
                errors: &state.errors,
                general_error: general_error.as_deref(),
                summary: &summary,
            },
        )?;
        processor.release();

        info!(
            run_id = state.run_id,
            status = %status,
            total = state.counters.total_rows,
            success = state.counters.success_rows,
            failed = state.counters.failed_rows,
            files_created = summary.files_created,
            "导入运行结束"
        );

        Ok(RunReport {
            run_id: state.run_id,
            status,
            counters: state.counters,
            errors: std::mem::take(&mut state.errors),
            general_error,
            summary,
        })
    }
}

fn chunk_error(sheet: &str, first_row: usize, err: &ImportError) -> RowError {
    RowError {
        sheet: sheet.to_string(),
        row_number: first_row,
        data: Vec::new(),
        message: format!("块提交失败: {}", err),
    }
}

/// 追加错误（超过上限的只计数不保留）
fn push_capped(errors: &mut Vec<RowError>, new_errors: Vec<RowError>, cap: usize) {
    let room = cap.saturating_sub(errors.len());
    errors.extend(new_errors.into_iter().take(room));
}
