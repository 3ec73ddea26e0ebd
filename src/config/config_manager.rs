// ==========================================
// 档案批量导入引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 规则: 缺失或非法的数值配置回落到内置默认值（记录 warn）
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::{configure_sqlite_connection, open_and_init};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

// ==========================================
// 配置键 + 默认值
// ==========================================
pub mod config_keys {
    pub const CHUNK_SIZE: &str = "import_chunk_size";
    pub const ERROR_CAP: &str = "import_error_cap";
    pub const PROGRESS_INTERVAL: &str = "import_progress_interval";
    pub const FILE_BATCH_SIZE: &str = "import_file_batch_size";
    pub const MAX_LAND_RANGE: &str = "import_max_land_range";
    pub const DEFAULT_GOVERNORATE: &str = "import_default_governorate";
    pub const DEFAULT_CITY: &str = "import_default_city";
    pub const UNNAMED_OWNER: &str = "import_unnamed_owner";
    pub const MISSING_FILE_NAME: &str = "import_missing_file_name";
}

pub mod config_defaults {
    pub const CHUNK_SIZE: usize = 500;
    pub const ERROR_CAP: usize = 100;
    pub const PROGRESS_INTERVAL: usize = 2500;
    pub const FILE_BATCH_SIZE: usize = 100;
    pub const MAX_LAND_RANGE: u64 = 1000;
    pub const DEFAULT_GOVERNORATE: &str = "القاهرة";
    pub const DEFAULT_CITY: &str = "القاهرة الجديدة";
    pub const UNNAMED_OWNER: &str = "لا يوجد اسم";
    pub const MISSING_FILE_NAME: &str = "لا يوجد";
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_and_init(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取配置值，带默认值（空白值视为未配置）
    pub fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_config_value(key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入配置值（UPSERT）
    pub fn set_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 列出全部 global 配置
    pub fn list_config(&self) -> RepositoryResult<HashMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }

    /// 读取正整数配置（非法值回落默认值）
    fn get_positive<T>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T: FromStr + PartialOrd + Default + Copy + std::fmt::Display,
    {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(default);
        };

        match raw.trim().parse::<T>() {
            Ok(v) if v > T::default() => Ok(v),
            _ => {
                warn!(key = key, value = %raw, default = %default, "配置值非法，使用默认值");
                Ok(default)
            }
        }
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    // ===== 批次与进度 =====

    async fn get_chunk_size(&self) -> RepositoryResult<usize> {
        self.get_positive(config_keys::CHUNK_SIZE, config_defaults::CHUNK_SIZE)
    }

    async fn get_error_cap(&self) -> RepositoryResult<usize> {
        self.get_positive(config_keys::ERROR_CAP, config_defaults::ERROR_CAP)
    }

    async fn get_progress_interval(&self) -> RepositoryResult<usize> {
        self.get_positive(
            config_keys::PROGRESS_INTERVAL,
            config_defaults::PROGRESS_INTERVAL,
        )
    }

    async fn get_file_batch_size(&self) -> RepositoryResult<usize> {
        self.get_positive(config_keys::FILE_BATCH_SIZE, config_defaults::FILE_BATCH_SIZE)
    }

    // ===== 解析 =====

    async fn get_max_land_range(&self) -> RepositoryResult<u64> {
        self.get_positive(config_keys::MAX_LAND_RANGE, config_defaults::MAX_LAND_RANGE)
    }

    // ===== 缺省值 =====

    async fn get_default_governorate(&self) -> RepositoryResult<String> {
        self.get_config_or_default(
            config_keys::DEFAULT_GOVERNORATE,
            config_defaults::DEFAULT_GOVERNORATE,
        )
    }

    async fn get_default_city(&self) -> RepositoryResult<String> {
        self.get_config_or_default(config_keys::DEFAULT_CITY, config_defaults::DEFAULT_CITY)
    }

    async fn get_unnamed_owner(&self) -> RepositoryResult<String> {
        self.get_config_or_default(config_keys::UNNAMED_OWNER, config_defaults::UNNAMED_OWNER)
    }

    async fn get_missing_file_name(&self) -> RepositoryResult<String> {
        self.get_config_or_default(
            config_keys::MISSING_FILE_NAME,
            config_defaults::MISSING_FILE_NAME,
        )
    }
}
