// ==========================================
// 档案批量导入引擎 - 表格源（文件解析器）
// ==========================================
// 支持: Excel (.xlsx/.xls/.xlsm/.xlsb/.ods) / CSV (.csv)
// 输出: 工作表序列，每个工作表 = 表头 + 原始数据行（带源行号）
// 约定: 行号从 1 开始，表头为第 1 行；全空行跳过
// ==========================================

use crate::importer::data_cleaner::clean_value;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};

// ==========================================
// 工作表数据结构
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// 源文件中的行号（1-based，表头为第 1 行）
    pub row_number: usize,
    pub cells: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl SheetData {
    /// 由原始二维数据构造（第一行视为表头）
    pub fn from_grid(name: impl Into<String>, grid: Vec<Vec<Option<String>>>) -> Self {
        let mut iter = grid.into_iter();
        let headers = iter
            .next()
            .map(|h| h.into_iter().map(|c| c.unwrap_or_default()).collect())
            .unwrap_or_default();

        let rows = iter
            .enumerate()
            .filter(|(_, cells)| !is_blank(cells))
            .map(|(idx, cells)| SourceRow {
                row_number: idx + 2,
                cells,
            })
            .collect();

        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

fn is_blank(cells: &[Option<String>]) -> bool {
    cells.iter().all(|c| clean_value(c.as_deref()).is_none())
}

// ==========================================
// SpreadsheetSource Trait
// ==========================================
pub trait SpreadsheetSource: Send {
    /// 源描述（日志用）
    fn describe(&self) -> String;

    /// 读取全部工作表
    ///
    /// # 错误
    /// - 文件不可读 / 格式损坏 → 源文件错误（整个运行失败）
    fn sheets(&mut self) -> ImportResult<Vec<SheetData>>;
}

// ==========================================
// Excel 源（calamine，全部工作表）
// ==========================================
pub struct ExcelSource {
    path: PathBuf,
}

impl ExcelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SpreadsheetSource for ExcelSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn sheets(&mut self) -> ImportResult<Vec<SheetData>> {
        ensure_exists(&self.path)?;

        let mut workbook = open_workbook_auto(&self.path)?;
        let mut sheets = Vec::new();

        for sheet_name in workbook.sheet_names() {
            let range = workbook.worksheet_range(&sheet_name)?;

            // 首个非空单元格所在行
            let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);

            let mut rows_iter = range.rows();
            let Some(header_row) = rows_iter.next() else {
                sheets.push(SheetData {
                    name: sheet_name,
                    headers: Vec::new(),
                    rows: Vec::new(),
                });
                continue;
            };

            let headers = header_row
                .iter()
                .map(|c| cell_to_string(c).unwrap_or_default())
                .collect();

            let rows = rows_iter
                .enumerate()
                .map(|(idx, cells)| SourceRow {
                    row_number: first_row + idx + 2,
                    cells: cells.iter().map(cell_to_string).collect(),
                })
                .filter(|row| !is_blank(&row.cells))
                .collect();

            sheets.push(SheetData {
                name: sheet_name,
                headers,
                rows,
            });
        }

        Ok(sheets)
    }
}

/// 单元格转字符串（整数值浮点数去掉小数部分）
pub fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                Some(format!("{}", *f as i64))
            } else {
                Some(f.to_string())
            }
        }
        Data::Int(i) => Some(i.to_string()),
        other => Some(other.to_string()),
    }
}

// ==========================================
// CSV 源（单工作表，名称取文件名）
// ==========================================
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SpreadsheetSource for CsvSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn sheets(&mut self) -> ImportResult<Vec<SheetData>> {
        ensure_exists(&self.path)?;

        let file = File::open(&self.path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let mut grid = Vec::new();
        for result in reader.records() {
            let record = result?;
            grid.push(
                record
                    .iter()
                    .map(|v| Some(v.trim_start_matches('\u{feff}').to_string()))
                    .collect::<Vec<_>>(),
            );
        }

        let name = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "csv".to_string());

        Ok(vec![SheetData::from_grid(name, grid)])
    }
}

// ==========================================
// 内存源（预读数据 / 测试）
// ==========================================
pub struct MemorySource {
    sheets: Vec<SheetData>,
}

impl MemorySource {
    pub fn new(sheets: Vec<SheetData>) -> Self {
        Self { sheets }
    }

    /// 单工作表便捷构造（字符串网格，空串视为空单元格）
    pub fn single(name: &str, grid: &[&[&str]]) -> Self {
        let grid = grid
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                    .collect()
            })
            .collect();
        Self::new(vec![SheetData::from_grid(name, grid)])
    }
}

impl SpreadsheetSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory({} sheets)", self.sheets.len())
    }

    fn sheets(&mut self) -> ImportResult<Vec<SheetData>> {
        Ok(std::mem::take(&mut self.sheets))
    }
}

// ==========================================
// 通用源（根据扩展名自动选择）
// ==========================================
pub fn open_source<P: AsRef<Path>>(path: P) -> ImportResult<Box<dyn SpreadsheetSource>> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" => Ok(Box::new(CsvSource::new(path))),
        "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Ok(Box::new(ExcelSource::new(path))),
        _ => Err(ImportError::UnsupportedFormat(ext)),
    }
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ImportError::FileNotFound(path.display().to_string()))
    }
}
