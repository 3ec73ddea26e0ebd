// ==========================================
// 档案批量导入引擎 - 运行配置快照
// ==========================================
// 每个运行开始前读取一次，运行期间不变
// ==========================================

use crate::config::config_manager::config_defaults;
use crate::config::import_config_trait::ImportConfigReader;
use crate::repository::error::RepositoryResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub chunk_size: usize,
    pub error_cap: usize,
    pub progress_interval: usize,
    pub file_batch_size: usize,
    pub max_land_range: u64,
    pub default_governorate: String,
    pub default_city: String,
    pub unnamed_owner: String,
    pub missing_file_name: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            chunk_size: config_defaults::CHUNK_SIZE,
            error_cap: config_defaults::ERROR_CAP,
            progress_interval: config_defaults::PROGRESS_INTERVAL,
            file_batch_size: config_defaults::FILE_BATCH_SIZE,
            max_land_range: config_defaults::MAX_LAND_RANGE,
            default_governorate: config_defaults::DEFAULT_GOVERNORATE.to_string(),
            default_city: config_defaults::DEFAULT_CITY.to_string(),
            unnamed_owner: config_defaults::UNNAMED_OWNER.to_string(),
            missing_file_name: config_defaults::MISSING_FILE_NAME.to_string(),
        }
    }
}

impl ImportSettings {
    /// 从配置读取器加载快照
    pub async fn load(reader: &dyn ImportConfigReader) -> RepositoryResult<Self> {
        Ok(Self {
            chunk_size: reader.get_chunk_size().await?,
            error_cap: reader.get_error_cap().await?,
            progress_interval: reader.get_progress_interval().await?,
            file_batch_size: reader.get_file_batch_size().await?,
            max_land_range: reader.get_max_land_range().await?,
            default_governorate: reader.get_default_governorate().await?,
            default_city: reader.get_default_city().await?,
            unnamed_owner: reader.get_unnamed_owner().await?,
            missing_file_name: reader.get_missing_file_name().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_manager::{config_keys, ConfigManager};
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_snapshot_with_override() {
        let temp_file = NamedTempFile::new().unwrap();
        let manager = ConfigManager::new(temp_file.path().to_str().unwrap()).unwrap();
        manager
            .set_config_value(config_keys::DEFAULT_GOVERNORATE, "الجيزة")
            .unwrap();

        let settings = ImportSettings::load(&manager).await.unwrap();
        assert_eq!(settings.default_governorate, "الجيزة");
        assert_eq!(settings.chunk_size, ImportSettings::default().chunk_size);
    }
}
