// ==========================================
// 档案批量导入引擎 - 表头标准化 + 字段映射
// ==========================================
// 职责:
// - 原始表头（阿拉伯语、拼写变体）→ 规范字段键
// - (规范表头, 清洗后单元格) → 类型化行结构 ImportRow
// 规则: 别名查找不区分大小写；未登记的表头降级为小写副本，不报错
// ==========================================

use crate::domain::import_run::ROW_ERROR_FIELD_LIMIT;
use crate::domain::types::ImportType;
use crate::importer::data_cleaner::clean_value;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ==========================================
// 规范字段键
// ==========================================
pub mod fields {
    pub const FILE_NUMBER: &str = "file_number";
    pub const FILE_NAME: &str = "file_name";
    pub const OWNER_NAME: &str = "owner_name";
    pub const LAND_NO: &str = "land_no";
    pub const UNIT_NO: &str = "unit_no";
    pub const GOVERNORATE: &str = "governorate";
    pub const CITY: &str = "city";
    pub const DISTRICT: &str = "district";
    pub const ZONE: &str = "zone";
    pub const AREA: &str = "area";
    pub const ROOM: &str = "room";
    pub const LANE: &str = "lane";
    pub const STAND: &str = "stand";
    pub const RACK: &str = "rack";
    pub const CLIENT_CODE: &str = "client_code";
    pub const NATIONAL_ID: &str = "national_id";
    pub const TELEPHONE: &str = "telephone";
    pub const MOBILE: &str = "mobile";
    pub const NOTES: &str = "notes";
}

// ==========================================
// 表头别名表（多对一）
// ==========================================
static HEADER_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    use fields::*;
    HashMap::from([
        // 文件
        ("رقم", FILE_NUMBER),
        ("رقم الملف", FILE_NAME),
        ("الملف", FILE_NAME),
        // 业主 / 客户
        ("المالك", OWNER_NAME),
        ("الاسم", OWNER_NAME),
        ("اسم العميل", OWNER_NAME),
        ("اسم المالك", OWNER_NAME),
        ("client_name", OWNER_NAME),
        ("name", OWNER_NAME),
        // 地块编号
        ("رقم القطعه", LAND_NO),
        ("رقم القطعة", LAND_NO),
        ("القطعه", LAND_NO),
        ("القطعة", LAND_NO),
        ("قطعه فرعية", LAND_NO),
        ("فرعية", LAND_NO),
        ("رقم الوحدة", UNIT_NO),
        // 地理层级
        ("المحافظة", GOVERNORATE),
        ("المحافظه", GOVERNORATE),
        ("المدينة", CITY),
        ("المدينه", CITY),
        ("الحي", DISTRICT),
        ("الحى", DISTRICT),
        ("المنطقة", ZONE),
        ("المنطقه", ZONE),
        ("المجاورة", AREA),
        ("المجاوره", AREA),
        // 物理位置
        ("الاوضة", ROOM),
        ("الاوضه", ROOM),
        ("الوحدة", ROOM),
        ("الممر", LANE),
        ("الاستند", STAND),
        ("الرف", RACK),
        // 客户属性
        ("كود", CLIENT_CODE),
        ("الرقم القومي", NATIONAL_ID),
        ("الهاتف", TELEPHONE),
        ("التليفون", TELEPHONE),
        ("الموبايل", MOBILE),
        ("ملاحظات", NOTES),
        // 其他
        ("الوظيفة", "job"),
        ("العمر", "age"),
        ("الأسرة", "family"),
        ("الدور", "floor"),
    ])
});

/// 标准化单个表头
pub fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(key) = HEADER_ALIASES.get(trimmed) {
        return (*key).to_string();
    }
    let lowered = trimmed.to_lowercase();
    match HEADER_ALIASES.get(lowered.as_str()) {
        Some(key) => (*key).to_string(),
        None => lowered,
    }
}

/// 标准化整行表头（等长输出，不会失败）
pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    raw.iter().map(|h| normalize_header(h)).collect()
}

/// 各导入类型的模板表头
pub fn template_headers(import_type: ImportType) -> &'static [&'static str] {
    match import_type {
        ImportType::Archive => &[
            "رقم", "الملف", "المالك", "القطعه", "الحي", "المنطقة", "المجاورة", "الاوضة",
            "الممر", "الاستند", "الرف",
        ],
        ImportType::Full => &[
            "اسم العميل", "الرقم القومي", "الهاتف", "الموبايل", "المحافظة", "المدينة",
            "الحي", "المنطقة", "المجاورة", "رقم القطعة", "رقم الوحدة", "ملاحظات",
        ],
        ImportType::Clients => &["اسم العميل", "الرقم القومي", "الهاتف", "الموبايل", "ملاحظات"],
        ImportType::Lands => &[
            "اسم العميل", "المحافظة", "المدينة", "الحي", "المنطقة", "المجاورة", "رقم القطعة",
            "رقم الوحدة",
        ],
        ImportType::Geographic => &["المحافظة", "المدينة", "الحي", "المنطقة", "المجاورة"],
    }
}

// ==========================================
// ImportRow - 类型化行结构
// ==========================================
// 生命周期: 仅在单行处理期间
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    pub sheet: String,
    pub row_number: usize,

    pub file_number: Option<String>,
    pub file_name: Option<String>,
    pub owner_name: Option<String>,
    pub land_no: Option<String>,
    pub unit_no: Option<String>,

    pub governorate: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub zone: Option<String>,
    pub area: Option<String>,

    pub room: Option<String>,
    pub lane: Option<String>,
    pub stand: Option<String>,
    pub rack: Option<String>,

    pub client_code: Option<String>,
    pub national_id: Option<String>,
    pub telephone: Option<String>,
    pub mobile: Option<String>,
    pub notes: Option<String>,

    /// 未映射到规范字段的列
    pub extras: BTreeMap<String, String>,
    /// 前若干个有值字段（用于错误报告）
    pub preview: Vec<(String, String)>,
}

impl ImportRow {
    fn slot(&mut self, key: &str) -> Option<&mut Option<String>> {
        use fields::*;
        let slot = match key {
            FILE_NUMBER => &mut self.file_number,
            FILE_NAME => &mut self.file_name,
            OWNER_NAME => &mut self.owner_name,
            LAND_NO => &mut self.land_no,
            UNIT_NO => &mut self.unit_no,
            GOVERNORATE => &mut self.governorate,
            CITY => &mut self.city,
            DISTRICT => &mut self.district,
            ZONE => &mut self.zone,
            AREA => &mut self.area,
            ROOM => &mut self.room,
            LANE => &mut self.lane,
            STAND => &mut self.stand,
            RACK => &mut self.rack,
            CLIENT_CODE => &mut self.client_code,
            NATIONAL_ID => &mut self.national_id,
            TELEPHONE => &mut self.telephone,
            MOBILE => &mut self.mobile,
            NOTES => &mut self.notes,
            _ => return None,
        };
        Some(slot)
    }
}

// ==========================================
// FieldMapper - 行映射
// ==========================================
pub struct FieldMapper;

impl FieldMapper {
    /// 将一行原始单元格映射为 ImportRow
    ///
    /// # 参数
    /// - headers: 已标准化的表头
    /// - cells: 原始单元格（按列）
    ///
    /// # 说明
    /// - 多列映射到同一字段时，取第一个有值的列
    /// - 空表头列忽略
    pub fn map_row(
        &self,
        sheet: &str,
        row_number: usize,
        headers: &[String],
        cells: &[Option<String>],
    ) -> ImportRow {
        let mut row = ImportRow {
            sheet: sheet.to_string(),
            row_number,
            ..Default::default()
        };

        for (key, cell) in headers.iter().zip(cells.iter()) {
            if key.is_empty() {
                continue;
            }
            let Some(value) = clean_value(cell.as_deref()) else {
                continue;
            };

            if row.preview.len() < ROW_ERROR_FIELD_LIMIT {
                row.preview.push((key.clone(), value.clone()));
            }

            match row.slot(key) {
                Some(slot) => {
                    if slot.is_none() {
                        *slot = Some(value);
                    }
                }
                None => {
                    row.extras.entry(key.clone()).or_insert(value);
                }
            }
        }

        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_normalize_header_variants() {
        assert_eq!(normalize_header(" الحى "), "district");
        assert_eq!(normalize_header("الحي"), "district");
        assert_eq!(normalize_header("القطعه"), "land_no");
        assert_eq!(normalize_header("القطعة"), "land_no");
        assert_eq!(normalize_header("المالك"), "owner_name");
    }

    #[test]
    fn test_normalize_header_passthrough() {
        assert_eq!(normalize_header("  Extra Column "), "extra column");
        assert_eq!(normalize_header("عمود مجهول"), "عمود مجهول");
    }

    #[test]
    fn test_normalize_header_ignores_case() {
        assert_eq!(normalize_header("Name"), "owner_name");
        assert_eq!(normalize_header(" CLIENT_NAME "), "owner_name");
    }

    #[test]
    fn test_normalize_headers_same_length() {
        let raw = vec!["رقم".to_string(), "".to_string(), "X".to_string()];
        let mapped = normalize_headers(&raw);
        assert_eq!(mapped, vec!["file_number", "", "x"]);
    }

    #[test]
    fn test_map_row_basic() {
        let headers = normalize_headers(&[
            "رقم".to_string(),
            "الملف".to_string(),
            "المالك".to_string(),
            "القطعه".to_string(),
            "الرف".to_string(),
            "ملاحظة اضافية".to_string(),
        ]);
        let cells = vec![s("12"), s(" ملف 1 "), s("أحمد"), s("نموذج 5"), s("null"), s("x")];

        let row = FieldMapper.map_row("ورقة1", 2, &headers, &cells);

        assert_eq!(row.file_number, s("12"));
        assert_eq!(row.file_name, s("ملف 1"));
        assert_eq!(row.owner_name, s("أحمد"));
        assert_eq!(row.land_no, s("نموذج 5"));
        assert_eq!(row.rack, None);
        assert_eq!(row.extras.get("ملاحظة اضافية"), Some(&"x".to_string()));
        assert_eq!(row.preview.len(), 5);
        assert_eq!(row.preview[0], ("file_number".to_string(), "12".to_string()));
    }

    #[test]
    fn test_map_row_first_present_column_wins() {
        let headers = normalize_headers(&["القطعه".to_string(), "فرعية".to_string()]);

        let row = FieldMapper.map_row("s", 3, &headers, &[None, s("7")]);
        assert_eq!(row.land_no, s("7"));

        let row = FieldMapper.map_row("s", 3, &headers, &[s("6"), s("7")]);
        assert_eq!(row.land_no, s("6"));
    }

    #[test]
    fn test_template_headers_map_to_known_fields() {
        for ty in ImportType::ALL {
            for header in template_headers(ty) {
                let key = normalize_header(header);
                let mut row = ImportRow::default();
                assert!(row.slot(&key).is_some(), "模板表头未映射: {}", header);
            }
        }
    }
}
