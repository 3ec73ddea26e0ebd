// ==========================================
// 档案批量导入引擎 - 单元格清洗器
// ==========================================
// 职责: TRIM + 空值哨兵标准化
// 规则: null / 空白 / "null"(不区分大小写) / "لا يوجد" → None
// ==========================================

/// 领域空值哨兵（"无"）
pub const NONE_SENTINEL: &str = "لا يوجد";

pub struct DataCleaner;

impl DataCleaner {
    /// 清洗单元格: 返回 None 表示"缺失"
    pub fn clean(&self, value: Option<&str>) -> Option<String> {
        clean_value(value)
    }

    /// 清洗整行
    pub fn clean_row(&self, cells: &[Option<String>]) -> Vec<Option<String>> {
        cells.iter().map(|c| clean_value(c.as_deref())).collect()
    }
}

/// 单元格清洗（下游只面对"有值 / 缺失"两种情况）
pub fn clean_value(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") || trimmed == NONE_SENTINEL {
        None
    } else {
        Some(trimmed.to_string())
    }
}
