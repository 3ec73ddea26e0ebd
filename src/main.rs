// ==========================================
// 档案批量导入引擎 - 命令行入口
// ==========================================
// 子命令: import / status / list / delete / template / config
// 数据库: --db 或 ARCHIVE_IMPORT_DB_PATH，缺省为用户数据目录
// ==========================================

use anyhow::{bail, Context, Result};
use archive_import::api::ImportApi;
use archive_import::domain::{ImportOptions, ImportType};
use archive_import::importer::ArchiveImporter;
use archive_import::logging;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "archive-import", version, about = "档案批量导入引擎")]
struct Cli {
    /// SQLite 数据库路径
    #[arg(long, global = true, env = "ARCHIVE_IMPORT_DB_PATH")]
    db: Option<String>,

    /// 以 JSON 行输出日志
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 导入一个或多个表格文件（多个文件并发执行）
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// full / clients / lands / geographic / archive
        #[arg(long = "type", short = 't', default_value = "archive")]
        import_type: ImportType,

        /// 首个行错误即中止运行（默认跳过错误行）
        #[arg(long)]
        strict: bool,

        /// 合并到已有客户/土地
        #[arg(long)]
        update_existing: bool,
    },

    /// 查看运行进度与错误
    Status { run_id: i64 },

    /// 列出最近的运行
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// 删除已结束的运行记录
    Delete { run_id: i64 },

    /// 生成导入模板（CSV 表头）
    Template {
        #[arg(long = "type", short = 't', default_value = "archive")]
        import_type: ImportType,

        /// 输出文件（缺省输出到标准输出）
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// 查看或修改导入参数
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    List,
    Set { key: String, value: String },
}

/// 默认数据库路径（用户数据目录）
fn default_db_path() -> String {
    let mut path = PathBuf::from("./archive_import.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("archive-import");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("archive_import.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.json_logs);

    let db_path = cli
        .db
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(default_db_path);
    tracing::info!(
        version = archive_import::VERSION,
        db = %db_path,
        "{}",
        archive_import::APP_NAME
    );

    let api = ImportApi::new(&db_path).context("初始化导入接口失败")?;

    match cli.command {
        Command::Import {
            files,
            import_type,
            strict,
            update_existing,
        } => {
            let options = ImportOptions {
                skip_errors: !strict,
                update_existing,
            };

            let results = api.batch_import(files.clone(), import_type, options).await;
            let mut failed = 0usize;

            for (file, result) in files.iter().zip(results) {
                match result {
                    Ok(report) => {
                        if !report.is_completed() {
                            failed += 1;
                        }
                        println!(
                            "{}: run={} status={} total={} success={} failed={}",
                            file.display(),
                            report.run_id,
                            report.status,
                            report.counters.total_rows,
                            report.counters.success_rows,
                            report.counters.failed_rows
                        );
                        if let Some(message) = &report.general_error {
                            println!("  错误: {}", message);
                        }
                        for row_error in &report.errors {
                            println!(
                                "  [{} 第{}行] {}",
                                row_error.sheet, row_error.row_number, row_error.message
                            );
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        println!("{}: 导入失败: {}", file.display(), e);
                    }
                }
            }

            if failed > 0 {
                bail!("{} 个文件导入失败", failed);
            }
        }

        Command::Status { run_id } => {
            let run = api.get_run(run_id)?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }

        Command::List { limit } => {
            for run in api.list_runs(Some(limit))? {
                println!(
                    "{}\t{}\t{}\t{}/{}\t{}",
                    run.id,
                    run.import_type,
                    run.status,
                    run.counters.processed_rows,
                    run.counters.total_rows,
                    run.original_filename.as_deref().unwrap_or("-")
                );
            }
        }

        Command::Delete { run_id } => {
            api.delete_run(run_id)?;
            println!("已删除运行 {}", run_id);
        }

        Command::Template { import_type, out } => {
            let headers = ImportApi::template_headers(import_type);
            match out {
                Some(path) => {
                    let mut writer = csv::Writer::from_path(&path)
                        .with_context(|| format!("无法创建模板文件: {}", path.display()))?;
                    writer.write_record(&headers)?;
                    writer.flush()?;
                    println!("模板已写入: {}", path.display());
                }
                None => {
                    let mut writer = csv::Writer::from_writer(std::io::stdout());
                    writer.write_record(&headers)?;
                    writer.flush()?;
                }
            }
        }

        Command::Config { action } => match action {
            ConfigAction::List => {
                let mut entries: Vec<_> = api.config().list_config()?.into_iter().collect();
                entries.sort();
                for (key, value) in entries {
                    println!("{} = {}", key, value);
                }
            }
            ConfigAction::Set { key, value } => {
                api.config().set_config_value(&key, &value)?;
                println!("{} = {}", key, value);
            }
        },
    }

    Ok(())
}
