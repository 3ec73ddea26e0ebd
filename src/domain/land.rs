// ==========================================
// 档案批量导入引擎 - 土地 / 档案文件模型
// ==========================================
// 职责: Land、ArchiveFile 实体及其导入草稿
// 自然键:
// - Land: (client_id, land_no, governorate_id)
// - ArchiveFile: barcode 全局唯一；(client_id, land_id, file_name) 用于去重
// ==========================================

use crate::domain::hierarchy::LocationPath;
use serde::{Deserialize, Serialize};

// ==========================================
// Land - 土地
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Land {
    pub id: i64,
    pub client_id: i64,
    pub land_no: String,
    pub unit_no: Option<String>,
    pub location: LocationPath,
}

/// Land 自然键（governorate 缺失按 0 处理，与唯一索引一致）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LandKey {
    pub client_id: i64,
    pub land_no: String,
    pub governorate_id: i64,
}

impl Land {
    pub fn key(&self) -> LandKey {
        LandKey {
            client_id: self.client_id,
            land_no: self.land_no.clone(),
            governorate_id: self.location.governorate_id.unwrap_or(0),
        }
    }
}

// ==========================================
// LandDraft - 待归并的土地
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandDraft {
    pub client_id: i64,
    pub land_no: String,
    pub unit_no: Option<String>,
    pub location: LocationPath,
}

impl LandDraft {
    pub fn key(&self) -> LandKey {
        LandKey {
            client_id: self.client_id,
            land_no: self.land_no.clone(),
            governorate_id: self.location.governorate_id.unwrap_or(0),
        }
    }

    /// 草稿属性合并到已有土地后是否有变化（仅非空属性覆盖）
    pub fn differs_from(&self, land: &Land) -> bool {
        fn changed(new: Option<i64>, old: Option<i64>) -> bool {
            matches!(new, Some(v) if old != Some(v))
        }
        let (n, o) = (&self.location, &land.location);

        changed(n.city_id, o.city_id)
            || changed(n.district_id, o.district_id)
            || changed(n.zone_id, o.zone_id)
            || changed(n.area_id, o.area_id)
            || changed(n.room_id, o.room_id)
            || changed(n.lane_id, o.lane_id)
            || changed(n.stand_id, o.stand_id)
            || changed(n.rack_id, o.rack_id)
            || matches!(&self.unit_no, Some(u) if land.unit_no.as_ref() != Some(u))
    }
}

// ==========================================
// ArchiveFile - 档案文件
// ==========================================
pub const FILE_STATUS_PENDING: &str = "pending";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveFile {
    pub id: i64,
    pub client_id: i64,
    pub land_id: i64,
    pub room_id: Option<i64>,
    pub lane_id: Option<i64>,
    pub stand_id: Option<i64>,
    pub rack_id: Option<i64>,
    pub file_name: String,
    pub barcode: String,
    pub status: String,
}

/// 待批量写入的文件记录（尚无 id）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArchiveFile {
    pub client_id: i64,
    pub land_id: i64,
    pub room_id: Option<i64>,
    pub lane_id: Option<i64>,
    pub stand_id: Option<i64>,
    pub rack_id: Option<i64>,
    pub file_name: String,
    pub barcode: String,
    pub status: String,
}

/// 文件去重键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileKey {
    pub client_id: i64,
    pub land_id: i64,
    pub file_name: String,
}

impl NewArchiveFile {
    pub fn key(&self) -> FileKey {
        FileKey {
            client_id: self.client_id,
            land_id: self.land_id,
            file_name: self.file_name.clone(),
        }
    }
}

/// 生成全局唯一条码（从不由输入派生）
pub fn generate_barcode() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("AR{}", &raw[..16])
}
