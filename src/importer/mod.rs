// ==========================================
// 档案批量导入引擎 - 导入层
// ==========================================
// 职责: 表格源 → 规范行 → 层级实体 → 档案文件
// 支持: Excel (.xlsx/.xls/.xlsm/.xlsb/.ods), CSV
// ==========================================

// 模块声明
pub mod data_cleaner;
pub mod entity_resolver;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod import_engine;
pub mod importer_trait;
pub mod land_number;
pub mod merged_cells;
pub mod row_processor;

// 重导出核心类型
pub use data_cleaner::{clean_value, DataCleaner};
pub use entity_resolver::EntityResolver;
pub use error::{ImportError, ImportResult};
pub use field_mapper::{normalize_header, template_headers, FieldMapper, ImportRow};
pub use file_parser::{
    open_source, CsvSource, ExcelSource, MemorySource, SheetData, SourceRow, SpreadsheetSource,
};
pub use import_engine::ImportEngine;
pub use land_number::parse_land_numbers;
pub use merged_cells::MergedCellTracker;
pub use row_processor::RowProcessor;

// 重导出 Trait 接口
pub use importer_trait::ArchiveImporter;
