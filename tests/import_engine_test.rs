// ==========================================
// 导入引擎集成测试
// ==========================================
// 测试目标: 块事务 / 行保存点 / 幂等重导 / 合并单元格补全 / 错误上限 /
//           严格模式回滚 / 源文件错误 / 取消与进度检查点
// ==========================================


use archive_import::config::{config_defaults, ImportSettings};
use archive_import::domain::{
    Client, ClientDraft, FileKey, ImportOptions, ImportStatus, ImportType, Land, LandDraft,
    NewArchiveFile, Node, NodeKind, RunCounters,
};
use archive_import::importer::{ExcelSource, ImportEngine, MemorySource, SheetData};
use archive_import::logging;
use archive_import::repository::{
    ImportRunRepository, ImportStore, RepositoryError, RepositoryResult, Resolved, RunOutcome,
    SqliteImportStore, StoreSnapshot,
};
use rusqlite::Connection;
use std::cell::{Cell, RefCell};
use std::io::Write;
use test_helpers::{
    count_rows, create_run, create_test_db, query_names, small_chunk_settings, ARCHIVE_HEADERS,
    LANDS_HEADERS,
};
use tokio_util::sync::CancellationToken;

fn grid(rows: &[&[&str]]) -> Vec<Vec<Option<String>>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                .collect()
        })
        .collect()
}

fn archive_source(rows: &[&[&str]]) -> MemorySource {
    let mut all: Vec<&[&str]> = vec![ARCHIVE_HEADERS];
    all.extend_from_slice(rows);
    MemorySource::single("Sheet1", &all)
}

fn lands_source(rows: &[&[&str]]) -> MemorySource {
    let mut all: Vec<&[&str]> = vec![LANDS_HEADERS];
    all.extend_from_slice(rows);
    MemorySource::single("lands", &all)
}

fn engine(db_path: &str, settings: ImportSettings) -> ImportEngine<SqliteImportStore> {
    let store = SqliteImportStore::new(db_path).expect("Failed to open store");
    ImportEngine::new(store, settings)
}

const ARCHIVE_ROWS: &[&[&str]] = &[
    &["1", "ملف 1", "أحمد", "نموذج 1-3", "الحي الأول", "غرفة 1", "ممر 1"],
    &["2", "", "", "نموذج 4", "الحي الأول", "", ""],
    &["3", "ملف 2", "سعيد", "", "", "", ""],
];

// ==========================================
// 档案导入端到端
// ==========================================

#[test]
fn test_archive_import_end_to_end() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let run_id = create_run(&db_path, ImportType::Archive, ImportOptions::default());

    let mut engine = engine(&db_path, ImportSettings::default());
    let mut source = archive_source(ARCHIVE_ROWS);
    let report = engine
        .run(run_id, ImportType::Archive, ImportOptions::default(), &mut source)
        .expect("Run should finish");

    assert!(report.is_completed(), "{:?}", report.general_error);
    assert_eq!(report.counters.total_rows, 3);
    assert_eq!(report.counters.processed_rows, 3);
    assert_eq!(report.counters.success_rows, 3);
    assert_eq!(report.counters.failed_rows, 0);
    assert!(report.errors.is_empty());

    // 第 2 行继承 أحمد / ملف 1；第 3 行无地块 → 占位地块
    assert_eq!(query_names(&db_path, "client"), vec!["أحمد", "سعيد"]);
    assert_eq!(count_rows(&db_path, "land"), 5);
    assert_eq!(count_rows(&db_path, "archive_file"), 5);
    assert_eq!(count_rows(&db_path, "governorate"), 1);
    assert_eq!(count_rows(&db_path, "city"), 1);
    assert_eq!(count_rows(&db_path, "district"), 1);
    assert_eq!(count_rows(&db_path, "room"), 1);
    assert_eq!(count_rows(&db_path, "lane"), 1);
    assert_eq!(
        query_names(&db_path, "governorate"),
        vec![config_defaults::DEFAULT_GOVERNORATE]
    );

    assert_eq!(report.summary.files_created, 5);
    assert_eq!(report.summary.sheets, 1);
    assert_eq!(report.summary.created_of(NodeKind::Governorate), 1);
    assert_eq!(report.summary.created.get("client").copied(), Some(2));
    assert_eq!(report.summary.created.get("land").copied(), Some(5));

    let runs = ImportRunRepository::new(&db_path).unwrap();
    let run = runs.get_run(run_id).unwrap().unwrap();
    assert_eq!(run.status, ImportStatus::Completed);
    assert_eq!(run.counters, report.counters);
    assert!(run.started_at.is_some());
    assert!(run.completed_at.is_some());
    assert_eq!(run.summary.as_ref().map(|s| s.files_created), Some(5));
}

#[test]
fn test_reimport_is_idempotent() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");

    for attempt in 0..2 {
        let run_id = create_run(&db_path, ImportType::Archive, ImportOptions::default());
        let mut engine = engine(&db_path, small_chunk_settings(2));
        let mut source = archive_source(ARCHIVE_ROWS);
        let report = engine
            .run(run_id, ImportType::Archive, ImportOptions::default(), &mut source)
            .unwrap();

        assert!(report.is_completed());
        assert_eq!(report.counters.success_rows, 3);
        if attempt == 1 {
            assert_eq!(report.summary.files_created, 0);
            assert!(report.summary.created.values().all(|n| *n == 0));
        }
    }

    assert_eq!(count_rows(&db_path, "client"), 2);
    assert_eq!(count_rows(&db_path, "land"), 5);
    assert_eq!(count_rows(&db_path, "archive_file"), 5);
    assert_eq!(count_rows(&db_path, "governorate"), 1);
}

#[test]
fn test_carry_forward_resets_between_sheets() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let run_id = create_run(&db_path, ImportType::Archive, ImportOptions::default());

    let first = SheetData::from_grid(
        "أ",
        grid(&[ARCHIVE_HEADERS, &["1", "ملف 1", "أحمد", "نموذج 1", "", "", ""]]),
    );
    let second = SheetData::from_grid(
        "ب",
        grid(&[ARCHIVE_HEADERS, &["1", "", "", "نموذج 9", "", "", ""]]),
    );
    let mut source = MemorySource::new(vec![first, second]);

    let mut engine = engine(&db_path, ImportSettings::default());
    let report = engine
        .run(run_id, ImportType::Archive, ImportOptions::default(), &mut source)
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.summary.sheets, 2);
    assert_eq!(
        query_names(&db_path, "client"),
        vec!["أحمد", config_defaults::UNNAMED_OWNER]
    );

    let conn = Connection::open(&db_path).unwrap();
    let file_name: String = conn
        .query_row(
            "SELECT f.file_name FROM archive_file f JOIN client c ON c.id = f.client_id
             WHERE c.name = ?1",
            [config_defaults::UNNAMED_OWNER],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(file_name, config_defaults::MISSING_FILE_NAME);
}

// ==========================================
// 错误处理
// ==========================================

#[test]
fn test_skip_errors_caps_recorded_errors() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let run_id = create_run(&db_path, ImportType::Lands, ImportOptions::default());

    let mut source = lands_source(&[
        &["عميل 1", "", "", "10"],
        &["عميل 2", "", "", ""],
        &["عميل 3", "", "", ""],
        &["عميل 4", "", "", ""],
        &["عميل 5", "", "", "11"],
        &["عميل 6", "", "", ""],
        &["عميل 7", "", "", ""],
    ]);
    let settings = ImportSettings {
        error_cap: 2,
        ..small_chunk_settings(3)
    };

    let mut engine = engine(&db_path, settings);
    let report = engine
        .run(run_id, ImportType::Lands, ImportOptions::default(), &mut source)
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.counters.processed_rows, 7);
    assert_eq!(report.counters.success_rows, 2);
    assert_eq!(report.counters.failed_rows, 5);
    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.errors[0].row_number, 3);
    assert_eq!(report.errors[1].row_number, 4);
    assert!(report.errors[0].message.contains("land_no"));
    assert!(report
        .errors[0]
        .data
        .iter()
        .any(|(k, v)| k == "owner_name" && v == "عميل 2"));

    // 失败行不创建客户
    assert_eq!(count_rows(&db_path, "client"), 2);
    assert_eq!(count_rows(&db_path, "land"), 2);

    let run = ImportRunRepository::new(&db_path)
        .unwrap()
        .get_run(run_id)
        .unwrap()
        .unwrap();
    assert_eq!(run.errors.len(), 2);
    assert_eq!(run.counters.failed_rows, 5);
}

#[test]
fn test_blank_owner_outside_archive_fails_row() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let run_id = create_run(&db_path, ImportType::Lands, ImportOptions::default());

    // 非档案导入不做向下补全: 空业主不能沿用上一行的客户
    let mut source = lands_source(&[&["عميل 1", "", "", "10"], &["", "", "", "11"]]);
    let report = engine(&db_path, ImportSettings::default())
        .run(run_id, ImportType::Lands, ImportOptions::default(), &mut source)
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.counters.success_rows, 1);
    assert_eq!(report.counters.failed_rows, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].row_number, 3);
    assert!(report.errors[0].message.contains("owner_name"));

    assert_eq!(query_names(&db_path, "client"), vec!["عميل 1"]);
    assert_eq!(count_rows(&db_path, "land"), 1);
}

#[test]
fn test_strict_mode_rolls_back_failed_chunk() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let options = ImportOptions {
        skip_errors: false,
        update_existing: false,
    };
    let run_id = create_run(&db_path, ImportType::Lands, options);

    let mut source = lands_source(&[
        &["عميل أ", "", "", "1"],
        &["عميل ب", "", "", "2"],
        &["عميل ج", "", "", "3"],
        &["عميل د", "", "", ""],
        &["عميل هـ", "", "", "5"],
    ]);

    let mut engine = engine(&db_path, small_chunk_settings(2));
    let report = engine
        .run(run_id, ImportType::Lands, options, &mut source)
        .unwrap();

    assert_eq!(report.status, ImportStatus::Failed);
    let message = report.general_error.clone().unwrap_or_default();
    assert!(message.contains("第 5 行"), "{}", message);

    // 第一个块已提交，第二个块整体回滚，第三个块未执行
    assert_eq!(report.counters.processed_rows, 2);
    assert_eq!(report.counters.success_rows, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].row_number, 5);
    assert_eq!(query_names(&db_path, "client"), vec!["عميل أ", "عميل ب"]);
    assert_eq!(count_rows(&db_path, "land"), 2);

    let run = ImportRunRepository::new(&db_path)
        .unwrap()
        .get_run(run_id)
        .unwrap()
        .unwrap();
    assert_eq!(run.status, ImportStatus::Failed);
    assert_eq!(run.counters.processed_rows, 2);
    assert!(run.completed_at.is_some());
}

#[test]
fn test_corrupt_workbook_fails_without_entities() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let run_id = create_run(&db_path, ImportType::Archive, ImportOptions::default());

    let mut workbook = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
    workbook.write_all(b"this is not a zip archive").unwrap();
    workbook.flush().unwrap();

    let mut source = ExcelSource::new(workbook.path());
    let mut engine = engine(&db_path, ImportSettings::default());
    let report = engine
        .run(run_id, ImportType::Archive, ImportOptions::default(), &mut source)
        .unwrap();

    assert_eq!(report.status, ImportStatus::Failed);
    assert!(report.general_error.is_some());
    assert_eq!(report.counters, RunCounters::default());
    for table in ["client", "land", "archive_file", "governorate"] {
        assert_eq!(count_rows(&db_path, table), 0, "{} should be empty", table);
    }
}

#[test]
fn test_missing_file_fails_run() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let run_id = create_run(&db_path, ImportType::Archive, ImportOptions::default());

    let mut source = ExcelSource::new("/nonexistent/archive.xlsx");
    let mut engine = engine(&db_path, ImportSettings::default());
    let report = engine
        .run(run_id, ImportType::Archive, ImportOptions::default(), &mut source)
        .unwrap();

    assert_eq!(report.status, ImportStatus::Failed);
    assert!(report
        .general_error
        .as_deref()
        .unwrap_or_default()
        .contains("文件不存在"));
}

// ==========================================
// 合并已有记录
// ==========================================

#[test]
fn test_update_existing_merges_client_attributes() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let headers: &[&str] = &["اسم العميل", "الرقم القومي", "الموبايل", "رقم القطعة"];

    let first = MemorySource::single("s", &[headers, &["منى", "", "", "7"]]);
    let second = MemorySource::single("s", &[headers, &["منى", "29801011234567", "0100", "7"]]);

    for (mut source, update_existing) in [(first, false), (second, true)] {
        let options = ImportOptions {
            skip_errors: true,
            update_existing,
        };
        let run_id = create_run(&db_path, ImportType::Full, options);
        let report = engine(&db_path, ImportSettings::default())
            .run(run_id, ImportType::Full, options, &mut source)
            .unwrap();
        assert!(report.is_completed());
    }

    let conn = Connection::open(&db_path).unwrap();
    let (national_id, mobile): (Option<String>, Option<String>) = conn
        .query_row(
            "SELECT national_id, mobile FROM client WHERE name = 'منى'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(national_id.as_deref(), Some("29801011234567"));
    assert_eq!(mobile.as_deref(), Some("0100"));
    assert_eq!(count_rows(&db_path, "client"), 1);
    assert_eq!(count_rows(&db_path, "land"), 1);
}

// ==========================================
// 取消 + 进度检查点
// ==========================================

/// 记录检查点，在第 N 次块提交后触发取消，可让第 M 次土地写入失败
struct ObservedStore {
    inner: SqliteImportStore,
    cancel: CancellationToken,
    cancel_after_commits: usize,
    commits: Cell<usize>,
    checkpoints: RefCell<Vec<RunCounters>>,
    fail_land_call: Option<usize>,
    land_calls: Cell<usize>,
}

impl ObservedStore {
    fn new(db_path: &str, cancel: CancellationToken) -> Self {
        Self {
            inner: SqliteImportStore::new(db_path).unwrap(),
            cancel,
            cancel_after_commits: usize::MAX,
            commits: Cell::new(0),
            checkpoints: RefCell::new(Vec::new()),
            fail_land_call: None,
            land_calls: Cell::new(0),
        }
    }
}

impl ImportStore for ObservedStore {
    fn load_snapshot(&self) -> RepositoryResult<StoreSnapshot> {
        self.inner.load_snapshot()
    }

    fn begin_chunk(&self) -> RepositoryResult<()> {
        self.inner.begin_chunk()
    }

    fn commit_chunk(&self) -> RepositoryResult<()> {
        self.inner.commit_chunk()?;
        self.commits.set(self.commits.get() + 1);
        if self.commits.get() == self.cancel_after_commits {
            self.cancel.cancel();
        }
        Ok(())
    }

    fn rollback_chunk(&self) -> RepositoryResult<()> {
        self.inner.rollback_chunk()
    }

    fn begin_row(&self) -> RepositoryResult<()> {
        self.inner.begin_row()
    }

    fn release_row(&self) -> RepositoryResult<()> {
        self.inner.release_row()
    }

    fn rollback_row(&self) -> RepositoryResult<()> {
        self.inner.rollback_row()
    }

    fn get_or_create_node(
        &self,
        kind: NodeKind,
        parent_id: Option<i64>,
        name: &str,
    ) -> RepositoryResult<Resolved<Node>> {
        self.inner.get_or_create_node(kind, parent_id, name)
    }

    fn get_or_create_client(&self, draft: &ClientDraft) -> RepositoryResult<Resolved<Client>> {
        self.inner.get_or_create_client(draft)
    }

    fn update_client(&self, id: i64, draft: &ClientDraft) -> RepositoryResult<Client> {
        self.inner.update_client(id, draft)
    }

    fn set_client_files_code(&self, id: i64, files_code: &[String]) -> RepositoryResult<()> {
        self.inner.set_client_files_code(id, files_code)
    }

    fn get_or_create_land(&self, draft: &LandDraft) -> RepositoryResult<Resolved<Land>> {
        self.land_calls.set(self.land_calls.get() + 1);
        if self.fail_land_call == Some(self.land_calls.get()) {
            return Err(RepositoryError::DatabaseQueryError("磁盘 I/O 错误".to_string()));
        }
        self.inner.get_or_create_land(draft)
    }

    fn update_land(&self, id: i64, draft: &LandDraft) -> RepositoryResult<Land> {
        self.inner.update_land(id, draft)
    }

    fn file_exists(&self, key: &FileKey) -> RepositoryResult<bool> {
        self.inner.file_exists(key)
    }

    fn bulk_insert_files(&self, files: &[NewArchiveFile]) -> RepositoryResult<usize> {
        self.inner.bulk_insert_files(files)
    }

    fn mark_run_processing(&self, run_id: i64) -> RepositoryResult<()> {
        self.inner.mark_run_processing(run_id)
    }

    fn save_checkpoint(&self, run_id: i64, counters: &RunCounters) -> RepositoryResult<()> {
        self.checkpoints.borrow_mut().push(*counters);
        self.inner.save_checkpoint(run_id, counters)
    }

    fn finish_run(&self, run_id: i64, outcome: &RunOutcome<'_>) -> RepositoryResult<()> {
        self.inner.finish_run(run_id, outcome)
    }
}

fn numbered_lands(n: usize) -> Vec<Vec<String>> {
    (1..=n)
        .map(|i| {
            vec![
                format!("عميل {}", i),
                String::new(),
                String::new(),
                i.to_string(),
            ]
        })
        .collect()
}

fn lands_source_owned(rows: &[Vec<String>]) -> MemorySource {
    let mut all = vec![LANDS_HEADERS.iter().map(|h| h.to_string()).collect::<Vec<_>>()];
    all.extend(rows.iter().cloned());
    let grid = all
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|v| if v.is_empty() { None } else { Some(v) })
                .collect()
        })
        .collect();
    MemorySource::new(vec![SheetData::from_grid("lands", grid)])
}

fn observed_engine(
    db_path: &str,
    chunk_size: usize,
    cancel_after_commits: usize,
) -> ImportEngine<ObservedStore> {
    let cancel = CancellationToken::new();
    let store = ObservedStore {
        cancel_after_commits,
        ..ObservedStore::new(db_path, cancel.clone())
    };
    ImportEngine::new(store, small_chunk_settings(chunk_size)).with_cancellation(cancel)
}

#[test]
fn test_failed_row_leaves_no_partial_writes() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let run_id = create_run(&db_path, ImportType::Archive, ImportOptions::default());

    // 第 2 行的第二块土地写入失败；第 3 行正常
    let store = ObservedStore {
        fail_land_call: Some(2),
        ..ObservedStore::new(&db_path, CancellationToken::new())
    };
    let mut engine = ImportEngine::new(store, ImportSettings::default());
    let mut source = archive_source(&[
        &["1", "ملف 1", "أحمد", "نموذج 1-3", "", "", ""],
        &["2", "ملف 2", "سعيد", "نموذج 9", "", "", ""],
    ]);
    let report = engine
        .run(run_id, ImportType::Archive, ImportOptions::default(), &mut source)
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.counters.success_rows, 1);
    assert_eq!(report.counters.failed_rows, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].row_number, 2);

    // 失败行的客户 / 土地 / 文件全部撤销
    assert_eq!(query_names(&db_path, "client"), vec!["سعيد"]);
    assert_eq!(count_rows(&db_path, "land"), 1);
    assert_eq!(count_rows(&db_path, "archive_file"), 1);
    assert_eq!(count_rows(&db_path, "governorate"), 1);
    assert_eq!(report.summary.created.get("client"), Some(&1));
    assert_eq!(report.summary.created.get("land"), Some(&1));
    assert_eq!(report.summary.files_created, 1);
}

#[test]
fn test_progress_checkpoints_are_monotonic() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let run_id = create_run(&db_path, ImportType::Lands, ImportOptions::default());

    let mut source = lands_source_owned(&numbered_lands(10));
    let mut engine = observed_engine(&db_path, 3, usize::MAX);
    let report = engine
        .run(run_id, ImportType::Lands, ImportOptions::default(), &mut source)
        .unwrap();
    assert!(report.is_completed());

    let checkpoints = engine.store().checkpoints.borrow().clone();
    assert!(checkpoints.len() >= 4, "{:?}", checkpoints);
    assert!(checkpoints.iter().all(|c| c.total_rows == 10));
    assert!(checkpoints
        .windows(2)
        .all(|w| w[0].processed_rows <= w[1].processed_rows));
    // 检查点只反映已提交块（块大小的整数倍）
    assert!(checkpoints
        .iter()
        .all(|c| c.processed_rows % 3 == 0 || c.processed_rows == 10));
    assert_eq!(report.counters.processed_rows, 10);
}

#[test]
fn test_cancellation_between_chunks_keeps_committed_work() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let run_id = create_run(&db_path, ImportType::Lands, ImportOptions::default());

    let mut source = lands_source_owned(&numbered_lands(10));
    let mut engine = observed_engine(&db_path, 3, 2);
    let report = engine
        .run(run_id, ImportType::Lands, ImportOptions::default(), &mut source)
        .unwrap();

    assert_eq!(report.status, ImportStatus::Failed);
    assert!(report.summary.cancelled);
    assert!(report.general_error.as_deref().unwrap_or_default().contains("取消"));
    assert_eq!(report.counters.total_rows, 10);
    assert_eq!(report.counters.processed_rows, 6);
    assert_eq!(count_rows(&db_path, "client"), 6);
    assert_eq!(count_rows(&db_path, "land"), 6);
}

#[test]
fn test_cancelled_before_start_creates_nothing() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let run_id = create_run(&db_path, ImportType::Archive, ImportOptions::default());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut engine = engine(&db_path, ImportSettings::default()).with_cancellation(cancel);
    let mut source = archive_source(ARCHIVE_ROWS);
    let report = engine
        .run(run_id, ImportType::Archive, ImportOptions::default(), &mut source)
        .unwrap();

    assert_eq!(report.status, ImportStatus::Failed);
    assert_eq!(report.counters.processed_rows, 0);
    assert_eq!(count_rows(&db_path, "client"), 0);
}
