// ==========================================
// 档案批量导入引擎 - 领域类型定义
// ==========================================
// 职责: 导入类型 / 运行状态 / 层级节点种类等封闭枚举
// 序列化格式: snake_case (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 导入类型 (Import Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportType {
    Full,       // 客户 + 地理 + 单块土地
    Clients,    // 仅客户
    Lands,      // 客户 + 地理 + 单块土地
    Geographic, // 仅地理层级
    Archive,    // 档案: 地理 + 物理位置 + 客户 + 多块土地 + 文件
}

impl ImportType {
    pub const ALL: [ImportType; 5] = [
        ImportType::Full,
        ImportType::Clients,
        ImportType::Lands,
        ImportType::Geographic,
        ImportType::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportType::Full => "full",
            ImportType::Clients => "clients",
            ImportType::Lands => "lands",
            ImportType::Geographic => "geographic",
            ImportType::Archive => "archive",
        }
    }

    /// 是否启用"无名业主"兜底（仅档案导入）
    pub fn defaults_owner_name(&self) -> bool {
        matches!(self, ImportType::Archive)
    }

    /// 是否对合并单元格做向下补全（仅档案导入；其他类型缺失即行失败）
    pub fn carries_forward(&self) -> bool {
        matches!(self, ImportType::Archive)
    }
}

impl fmt::Display for ImportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(ImportType::Full),
            "clients" => Ok(ImportType::Clients),
            "lands" => Ok(ImportType::Lands),
            "geographic" => Ok(ImportType::Geographic),
            "archive" => Ok(ImportType::Archive),
            other => Err(format!("未知导入类型: {}", other)),
        }
    }
}

// ==========================================
// 导入运行状态 (Import Status)
// ==========================================
// 流转: pending → validating → processing → completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Pending,
    Validating,
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Validating => "validating",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }

    /// 运行中（不可删除）
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ImportStatus::Pending | ImportStatus::Validating | ImportStatus::Processing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Completed | ImportStatus::Failed)
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(ImportStatus::Pending),
            "validating" => Ok(ImportStatus::Validating),
            "processing" => Ok(ImportStatus::Processing),
            "completed" => Ok(ImportStatus::Completed),
            "failed" => Ok(ImportStatus::Failed),
            other => Err(format!("未知导入状态: {}", other)),
        }
    }
}

// ==========================================
// 层级节点种类 (Node Kind)
// ==========================================
// 地理: governorate → city → district → zone → area
// 物理: room → lane → stand → rack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Governorate,
    City,
    District,
    Zone,
    Area,
    Room,
    Lane,
    Stand,
    Rack,
}

impl NodeKind {
    pub const ALL: [NodeKind; 9] = [
        NodeKind::Governorate,
        NodeKind::City,
        NodeKind::District,
        NodeKind::Zone,
        NodeKind::Area,
        NodeKind::Room,
        NodeKind::Lane,
        NodeKind::Stand,
        NodeKind::Rack,
    ];

    /// 表名（同时作为日志/汇总中的名称）
    pub fn table(&self) -> &'static str {
        match self {
            NodeKind::Governorate => "governorate",
            NodeKind::City => "city",
            NodeKind::District => "district",
            NodeKind::Zone => "zone",
            NodeKind::Area => "area",
            NodeKind::Room => "room",
            NodeKind::Lane => "lane",
            NodeKind::Stand => "stand",
            NodeKind::Rack => "rack",
        }
    }

    /// 上级种类；根级（省、档案室）返回 None
    pub fn parent(&self) -> Option<NodeKind> {
        match self {
            NodeKind::Governorate | NodeKind::Room => None,
            NodeKind::City => Some(NodeKind::Governorate),
            NodeKind::District => Some(NodeKind::City),
            NodeKind::Zone => Some(NodeKind::District),
            NodeKind::Area => Some(NodeKind::Zone),
            NodeKind::Lane => Some(NodeKind::Room),
            NodeKind::Stand => Some(NodeKind::Lane),
            NodeKind::Rack => Some(NodeKind::Stand),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}
