// ==========================================
// 档案批量导入引擎 - 配置层
// ==========================================
// 职责: 导入参数管理（块大小 / 错误上限 / 缺省地名等）
// 存储: config_kv 表，缺省回落内置默认值
// ==========================================

pub mod config_manager;
pub mod import_config_trait;
pub mod import_settings;

// 重导出核心配置管理器
pub use config_manager::{config_defaults, config_keys, ConfigManager};
pub use import_config_trait::ImportConfigReader;
pub use import_settings::ImportSettings;
