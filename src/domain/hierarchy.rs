// ==========================================
// 档案批量导入引擎 - 层级节点模型
// ==========================================
// 职责: 地理层级与物理位置层级的统一节点结构
// 约束: (parent_id, name) 在同一层级内唯一；根级按 name 唯一
// ==========================================

use crate::domain::types::NodeKind;
use serde::{Deserialize, Serialize};

// ==========================================
// Node - 层级节点
// ==========================================
// 生命周期: 导入中首次遇到时创建，之后复用，导入引擎不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub kind: NodeKind,
    pub parent_id: Option<i64>,
    pub name: String,
}

/// 名称标准化: 去首尾空白 + 折叠内部连续空白
///
/// 返回 None 表示标准化后为空
pub fn normalize_name(raw: &str) -> Option<String> {
    let joined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

// ==========================================
// LocationPath - 一行解析出的完整位置
// ==========================================
// 地理部分: 省/市必有（档案类导入），其余可选
// 物理部分: 全部可选，且下级只在上级存在时存在
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPath {
    pub governorate_id: Option<i64>,
    pub city_id: Option<i64>,
    pub district_id: Option<i64>,
    pub zone_id: Option<i64>,
    pub area_id: Option<i64>,
    pub room_id: Option<i64>,
    pub lane_id: Option<i64>,
    pub stand_id: Option<i64>,
    pub rack_id: Option<i64>,
}
