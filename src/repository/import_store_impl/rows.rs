// ==========================================
// SQLite 行 → 领域对象映射
// ==========================================

use crate::domain::client::Client;
use crate::domain::hierarchy::{LocationPath, Node};
use crate::domain::land::Land;
use crate::domain::types::NodeKind;
use rusqlite::types::Type;
use rusqlite::Row;

pub(super) const CLIENT_COLUMNS: &str =
    "id, name, national_id, client_code, telephone, mobile, notes, excel_row_number, files_code";

pub(super) const LAND_COLUMNS: &str = "id, client_id, land_no, unit_no, governorate_id, city_id, \
     district_id, zone_id, area_id, room_id, lane_id, stand_id, rack_id";

pub(super) fn node_from_row(kind: NodeKind, row: &Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        kind,
        parent_id: row.get(1)?,
        name: row.get(2)?,
    })
}

pub(super) fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    let files_code_raw: String = row.get(8)?;
    let files_code: Vec<String> = serde_json::from_str(&files_code_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
        national_id: row.get(2)?,
        client_code: row.get(3)?,
        telephone: row.get(4)?,
        mobile: row.get(5)?,
        notes: row.get(6)?,
        excel_row_number: row.get(7)?,
        files_code,
    })
}

pub(super) fn land_from_row(row: &Row<'_>) -> rusqlite::Result<Land> {
    Ok(Land {
        id: row.get(0)?,
        client_id: row.get(1)?,
        land_no: row.get(2)?,
        unit_no: row.get(3)?,
        location: LocationPath {
            governorate_id: row.get(4)?,
            city_id: row.get(5)?,
            district_id: row.get(6)?,
            zone_id: row.get(7)?,
            area_id: row.get(8)?,
            room_id: row.get(9)?,
            lane_id: row.get(10)?,
            stand_id: row.get(11)?,
            rack_id: row.get(12)?,
        },
    })
}
