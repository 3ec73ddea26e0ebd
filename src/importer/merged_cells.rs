// ==========================================
// 档案批量导入引擎 - 合并单元格补全
// ==========================================
// 场景: 档案表中业主名 / 文件名 / 文件编号通常纵向合并，
//       仅首行有值，后续行读取为空
// 规则:
// - 缺失值 → 使用本工作表最近一次观察到的值
// - 有值 → 更新状态
// - 每个工作表开始时重置
// ==========================================

use crate::importer::field_mapper::ImportRow;

#[derive(Debug, Default, Clone)]
pub struct MergedCellTracker {
    last_owner_name: Option<String>,
    last_file_name: Option<String>,
    last_file_number: Option<String>,
}

impl MergedCellTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 工作表切换时调用
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 补全当前行并更新状态
    ///
    /// # 参数
    /// - unnamed_owner: 若为 Some，业主名仍缺失时使用该默认值（不写回状态）
    pub fn apply(&mut self, row: &mut ImportRow, unnamed_owner: Option<&str>) {
        carry(&mut row.owner_name, &mut self.last_owner_name);
        carry(&mut row.file_name, &mut self.last_file_name);
        carry(&mut row.file_number, &mut self.last_file_number);

        if row.owner_name.is_none() {
            row.owner_name = unnamed_owner.map(str::to_string);
        }
    }
}

fn carry(value: &mut Option<String>, last: &mut Option<String>) {
    match value {
        Some(v) => *last = Some(v.clone()),
        None => *value = last.clone(),
    }
}
