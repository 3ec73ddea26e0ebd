// ==========================================
// 档案批量导入引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类:
// - 源文件错误: 整个运行失败
// - 行级错误: 记录后跳过（skip_errors）或中止当前块
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 源文件错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.xlsm/.ods/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 行级错误 =====
    #[error("必填字段缺失: {field}")]
    MissingRequiredField { field: String },

    #[error("缺少上级节点: {kind} 需要上级 {parent}")]
    MissingParent { kind: String, parent: String },

    // ===== 存储错误 =====
    #[error(transparent)]
    Store(#[from] RepositoryError),

    // ===== 运行控制 =====
    #[error("导入已取消")]
    Cancelled,

    #[error("运行记录不存在: {0}")]
    RunNotFound(i64),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    pub fn missing(field: &str) -> Self {
        ImportError::MissingRequiredField {
            field: field.to_string(),
        }
    }

    /// 源文件类错误（整个运行失败，不产生任何实体）
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            ImportError::FileNotFound(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::FileReadError(_)
                | ImportError::ExcelParseError(_)
                | ImportError::CsvParseError(_)
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Store(RepositoryError::from(err))
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_classification() {
        assert!(ImportError::FileNotFound("a.xlsx".into()).is_source_error());
        assert!(ImportError::ExcelParseError("bad zip".into()).is_source_error());
        assert!(!ImportError::missing("owner_name").is_source_error());
    }

    #[test]
    fn test_missing_field_message() {
        let err = ImportError::missing("land_no");
        assert!(err.to_string().contains("land_no"));
    }
}
