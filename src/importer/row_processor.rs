// ==========================================
// 档案批量导入引擎 - 行处理器
// ==========================================
// 职责: 按导入类型组合解析结果
// - archive: 地理 + 物理位置 + 客户 + 多块土地 + 每块土地一个文件
// - full / lands: 地理 + 客户 + 单块土地
// - clients: 仅客户
// - geographic: 仅地理层级
// 规则: 必填字段缺失 → 行失败（不影响运行）
// 文件: 缓冲后批量插入；同键 (client, land, file_name) 不重复创建
// 行失败: undo_row 回到行开始前的缓存 / 文件缓冲状态
// ==========================================

use crate::config::import_settings::ImportSettings;
use crate::domain::client::ClientDraft;
use crate::domain::hierarchy::{LocationPath, Node};
use crate::domain::import_run::ImportOptions;
use crate::domain::land::{
    generate_barcode, FileKey, LandDraft, NewArchiveFile, FILE_STATUS_PENDING,
};
use crate::domain::types::{ImportType, NodeKind};
use crate::importer::entity_resolver::{EntityResolver, ResolverMark};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::{fields, ImportRow};
use crate::importer::land_number::parse_land_numbers;
use crate::repository::import_store::ImportStore;
use std::collections::{BTreeMap, HashSet};
use tracing::trace;

/// 空土地编号的占位标识（按客户确定，重复导入保持幂等）
pub fn placeholder_land_no(client_id: i64) -> String {
    format!("قطعة-{}", client_id)
}

/// 行级撤销点
#[derive(Debug, Clone)]
pub struct RowMark {
    resolver: ResolverMark,
    buffered_files: usize,
    chunk_files: usize,
}

// ==========================================
// RowProcessor
// ==========================================
pub struct RowProcessor {
    import_type: ImportType,
    settings: ImportSettings,
    resolver: EntityResolver,

    file_buffer: Vec<NewArchiveFile>,
    seen_files: HashSet<FileKey>,
    chunk_files: Vec<FileKey>,
    pending_files: usize,
    files_created: usize,
}

impl RowProcessor {
    pub fn new(import_type: ImportType, options: ImportOptions, settings: ImportSettings) -> Self {
        Self {
            import_type,
            settings,
            resolver: EntityResolver::new(options.update_existing),
            file_buffer: Vec::new(),
            seen_files: HashSet::new(),
            chunk_files: Vec::new(),
            pending_files: 0,
            files_created: 0,
        }
    }

    pub fn import_type(&self) -> ImportType {
        self.import_type
    }

    /// 预加载实体缓存
    pub fn preload(&mut self, store: &dyn ImportStore) -> ImportResult<()> {
        self.resolver.preload(store)
    }

    /// 处理单行
    pub fn process(&mut self, store: &dyn ImportStore, row: &ImportRow) -> ImportResult<()> {
        trace!(sheet = %row.sheet, row = row.row_number, "处理行");
        match self.import_type {
            ImportType::Archive => self.process_archive(store, row),
            ImportType::Full | ImportType::Lands => self.process_single_land(store, row),
            ImportType::Clients => self.process_client(store, row),
            ImportType::Geographic => self.process_geographic(store, row),
        }
    }

    // ==========================================
    // archive
    // ==========================================
    fn process_archive(&mut self, store: &dyn ImportStore, row: &ImportRow) -> ImportResult<()> {
        let location = self.resolve_location(store, row)?;

        let draft = self.client_draft(row, row.owner_name.as_deref());
        let client = self
            .resolver
            .client(store, draft, row.file_number.as_deref())?;

        let mut land_numbers =
            parse_land_numbers(row.land_no.as_deref(), self.settings.max_land_range);
        if land_numbers.is_empty() {
            land_numbers.push(placeholder_land_no(client.id));
        }

        let file_name = row
            .file_name
            .clone()
            .unwrap_or_else(|| self.settings.missing_file_name.clone());

        for land_no in land_numbers {
            let land = self.resolver.land(
                store,
                LandDraft {
                    client_id: client.id,
                    land_no,
                    unit_no: row.unit_no.clone(),
                    location: location.clone(),
                },
            )?;

            let file = NewArchiveFile {
                client_id: client.id,
                land_id: land.id,
                room_id: location.room_id,
                lane_id: location.lane_id,
                stand_id: location.stand_id,
                rack_id: location.rack_id,
                file_name: file_name.clone(),
                barcode: generate_barcode(),
                status: FILE_STATUS_PENDING.to_string(),
            };
            self.queue_file(store, file)?;
        }

        Ok(())
    }

    // ==========================================
    // full / lands
    // ==========================================
    fn process_single_land(
        &mut self,
        store: &dyn ImportStore,
        row: &ImportRow,
    ) -> ImportResult<()> {
        let land_no = row
            .land_no
            .clone()
            .ok_or_else(|| ImportError::missing(fields::LAND_NO))?;
        let owner = row
            .owner_name
            .as_deref()
            .ok_or_else(|| ImportError::missing(fields::OWNER_NAME))?;

        let location = self.resolve_location(store, row)?;
        let draft = self.client_draft(row, Some(owner));
        let client = self
            .resolver
            .client(store, draft, row.file_number.as_deref())?;

        self.resolver.land(
            store,
            LandDraft {
                client_id: client.id,
                land_no,
                unit_no: row.unit_no.clone(),
                location,
            },
        )?;
        Ok(())
    }

    // ==========================================
    // clients
    // ==========================================
    fn process_client(&mut self, store: &dyn ImportStore, row: &ImportRow) -> ImportResult<()> {
        let owner = row
            .owner_name
            .as_deref()
            .ok_or_else(|| ImportError::missing(fields::OWNER_NAME))?;

        let draft = self.client_draft(row, Some(owner));
        self.resolver
            .client(store, draft, row.file_number.as_deref())?;
        Ok(())
    }

    // ==========================================
    // geographic
    // ==========================================
    fn process_geographic(&mut self, store: &dyn ImportStore, row: &ImportRow) -> ImportResult<()> {
        let governorate = self.resolver.governorate(store, row.governorate.as_deref())?;
        // 城市缺失时沿用省名
        let city_name = row.city.as_deref().or(Some(governorate.name.as_str()));
        let city = self.resolver.city(store, &governorate, city_name)?;
        self.resolve_sub_areas(store, &city, row)?;
        Ok(())
    }

    // ==========================================
    // 公共组合
    // ==========================================

    /// 地理层级（省 / 市缺失时使用默认值）+ 物理位置
    fn resolve_location(
        &mut self,
        store: &dyn ImportStore,
        row: &ImportRow,
    ) -> ImportResult<LocationPath> {
        let governorate_name = row
            .governorate
            .as_deref()
            .unwrap_or(&self.settings.default_governorate)
            .to_string();
        let city_name = row
            .city
            .as_deref()
            .unwrap_or(&self.settings.default_city)
            .to_string();

        let governorate = self.resolver.governorate(store, Some(&governorate_name))?;
        let city = self.resolver.city(store, &governorate, Some(&city_name))?;
        let (district, zone, area) = self.resolve_sub_areas(store, &city, row)?;

        let mut location = LocationPath {
            governorate_id: Some(governorate.id),
            city_id: Some(city.id),
            district_id: district.map(|n| n.id),
            zone_id: zone.map(|n| n.id),
            area_id: area.map(|n| n.id),
            ..Default::default()
        };

        // 物理位置整条链可选: 无房间则不解析下级
        if row.room.is_some() {
            let room = self.resolver.room(store, row.room.as_deref())?;
            let lane = self
                .resolver
                .optional_node(store, NodeKind::Lane, Some(&room), row.lane.as_deref())?;
            let stand = self
                .resolver
                .optional_node(store, NodeKind::Stand, lane.as_ref(), row.stand.as_deref())?;
            let rack = self
                .resolver
                .optional_node(store, NodeKind::Rack, stand.as_ref(), row.rack.as_deref())?;

            location.room_id = Some(room.id);
            location.lane_id = lane.map(|n| n.id);
            location.stand_id = stand.map(|n| n.id);
            location.rack_id = rack.map(|n| n.id);
        }

        Ok(location)
    }

    fn resolve_sub_areas(
        &mut self,
        store: &dyn ImportStore,
        city: &Node,
        row: &ImportRow,
    ) -> ImportResult<(Option<Node>, Option<Node>, Option<Node>)> {
        let district = self
            .resolver
            .optional_node(store, NodeKind::District, Some(city), row.district.as_deref())?;
        let zone = self
            .resolver
            .optional_node(store, NodeKind::Zone, district.as_ref(), row.zone.as_deref())?;
        let area = self
            .resolver
            .optional_node(store, NodeKind::Area, zone.as_ref(), row.area.as_deref())?;
        Ok((district, zone, area))
    }

    fn client_draft(&self, row: &ImportRow, name: Option<&str>) -> ClientDraft {
        ClientDraft {
            name: name.unwrap_or_default().to_string(),
            national_id: row.national_id.clone(),
            client_code: row.client_code.clone(),
            telephone: row.telephone.clone(),
            mobile: row.mobile.clone(),
            notes: row.notes.clone(),
            excel_row_number: Some(row.row_number as i64),
        }
    }

    // ==========================================
    // 文件缓冲
    // ==========================================

    fn queue_file(&mut self, store: &dyn ImportStore, file: NewArchiveFile) -> ImportResult<()> {
        let key = file.key();
        if self.seen_files.contains(&key) {
            return Ok(());
        }
        self.seen_files.insert(key.clone());
        self.chunk_files.push(key.clone());

        if store.file_exists(&key)? {
            return Ok(());
        }

        self.file_buffer.push(file);
        Ok(())
    }

    /// 缓冲达到批量阈值时刷新（仅在行边界调用，保证行保存点只覆盖本行）
    pub fn flush_if_full(&mut self, store: &dyn ImportStore) -> ImportResult<()> {
        if self.file_buffer.len() >= self.settings.file_batch_size {
            self.flush_files(store)?;
        }
        Ok(())
    }

    /// 刷新文件缓冲（块提交前必须调用）
    pub fn flush_files(&mut self, store: &dyn ImportStore) -> ImportResult<usize> {
        if self.file_buffer.is_empty() {
            return Ok(0);
        }
        let inserted = store.bulk_insert_files(&self.file_buffer)?;
        self.pending_files += inserted;
        self.file_buffer.clear();
        Ok(inserted)
    }

    // ==========================================
    // 行 / 块边界
    // ==========================================

    /// 行开始前的撤销点
    pub fn mark_row(&self) -> RowMark {
        RowMark {
            resolver: self.resolver.mark(),
            buffered_files: self.file_buffer.len(),
            chunk_files: self.chunk_files.len(),
        }
    }

    /// 行失败: 丢弃该行排队的文件并撤销缓存变更
    pub fn undo_row(&mut self, mark: RowMark) {
        self.resolver.undo_to(mark.resolver);
        self.file_buffer.truncate(mark.buffered_files);
        let start = mark.chunk_files.min(self.chunk_files.len());
        for key in self.chunk_files.drain(start..) {
            self.seen_files.remove(&key);
        }
    }

    pub fn commit_chunk(&mut self) {
        self.resolver.commit_chunk();
        self.files_created += self.pending_files;
        self.pending_files = 0;
        self.chunk_files.clear();
    }

    pub fn discard_chunk(&mut self) {
        self.resolver.discard_chunk();
        for key in self.chunk_files.drain(..) {
            self.seen_files.remove(&key);
        }
        self.file_buffer.clear();
        self.pending_files = 0;
    }

    /// 已提交的新建数量（按种类）
    pub fn created_counts(&self) -> BTreeMap<String, usize> {
        self.resolver.created_counts().clone()
    }

    pub fn files_created(&self) -> usize {
        self.files_created
    }

    /// 运行结束: 释放缓存
    pub fn release(&mut self) {
        self.resolver.clear();
        self.seen_files = HashSet::new();
        self.chunk_files = Vec::new();
        self.file_buffer = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::import_store_impl::SqliteImportStore;
    use rusqlite::Connection;

    fn store() -> SqliteImportStore {
        SqliteImportStore::from_connection(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn processor(import_type: ImportType) -> RowProcessor {
        RowProcessor::new(import_type, ImportOptions::default(), ImportSettings::default())
    }

    fn count(store: &SqliteImportStore, table: &str) -> i64 {
        store
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    fn archive_row(owner: &str, file: &str, land: Option<&str>) -> ImportRow {
        ImportRow {
            sheet: "s".to_string(),
            row_number: 2,
            owner_name: Some(owner.to_string()),
            file_name: Some(file.to_string()),
            land_no: land.map(str::to_string),
            district: Some("الحي الأول".to_string()),
            room: Some("غرفة 1".to_string()),
            lane: Some("ممر 2".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_archive_row_multi_land_files() {
        let store = store();
        let mut p = processor(ImportType::Archive);

        p.process(&store, &archive_row("أحمد", "ملف 1", Some("نموذج 1-3")))
            .unwrap();
        p.flush_files(&store).unwrap();
        p.commit_chunk();

        assert_eq!(count(&store, "land"), 3);
        assert_eq!(count(&store, "archive_file"), 3);
        assert_eq!(p.files_created(), 3);
        assert_eq!(count(&store, "governorate"), 1);
        assert_eq!(count(&store, "lane"), 1);
        assert_eq!(count(&store, "stand"), 0);
    }

    #[test]
    fn test_archive_placeholder_land() {
        let store = store();
        let mut p = processor(ImportType::Archive);

        p.process(&store, &archive_row("أحمد", "ملف 1", None)).unwrap();
        p.process(&store, &archive_row("أحمد", "ملف 1", None)).unwrap();
        p.flush_files(&store).unwrap();

        let land_no: String = store
            .connection()
            .query_row("SELECT land_no FROM land", [], |r| r.get(0))
            .unwrap();
        assert!(land_no.starts_with("قطعة-"));
        assert_eq!(count(&store, "archive_file"), 1);
    }

    #[test]
    fn test_lands_requires_land_no() {
        let store = store();
        let mut p = processor(ImportType::Lands);
        let row = ImportRow {
            owner_name: Some("أحمد".to_string()),
            ..Default::default()
        };
        let err = p.process(&store, &row).unwrap_err();
        assert!(matches!(err, ImportError::MissingRequiredField { ref field } if field == "land_no"));
        assert_eq!(count(&store, "client"), 0);
    }

    #[test]
    fn test_clients_only() {
        let store = store();
        let mut p = processor(ImportType::Clients);
        let row = ImportRow {
            owner_name: Some("سعيد".to_string()),
            national_id: Some("2990101".to_string()),
            land_no: Some("نموذج 5".to_string()),
            ..Default::default()
        };
        p.process(&store, &row).unwrap();

        assert_eq!(count(&store, "client"), 1);
        assert_eq!(count(&store, "land"), 0);
        assert_eq!(count(&store, "governorate"), 0);
    }

    #[test]
    fn test_geographic_city_defaults_to_governorate() {
        let store = store();
        let mut p = processor(ImportType::Geographic);
        let row = ImportRow {
            governorate: Some("الجيزة".to_string()),
            zone: Some("منطقة بلا حي".to_string()),
            ..Default::default()
        };
        p.process(&store, &row).unwrap();

        let city: String = store
            .connection()
            .query_row("SELECT name FROM city", [], |r| r.get(0))
            .unwrap();
        assert_eq!(city, "الجيزة");
        assert_eq!(count(&store, "zone"), 0);
        assert_eq!(count(&store, "client"), 0);

        let missing = p.process(&store, &ImportRow::default()).unwrap_err();
        assert!(matches!(missing, ImportError::MissingRequiredField { .. }));
    }

    #[test]
    fn test_discard_chunk_forgets_seen_files() {
        let store = store();
        let mut p = processor(ImportType::Archive);

        store.begin_chunk().unwrap();
        p.process(&store, &archive_row("أحمد", "ملف 1", Some("نموذج 1")))
            .unwrap();
        p.flush_files(&store).unwrap();
        store.rollback_chunk().unwrap();
        p.discard_chunk();

        p.process(&store, &archive_row("أحمد", "ملف 1", Some("نموذج 1")))
            .unwrap();
        p.flush_files(&store).unwrap();
        p.commit_chunk();

        assert_eq!(count(&store, "archive_file"), 1);
        assert_eq!(p.files_created(), 1);
    }

    #[test]
    fn test_undo_row_drops_queued_files() {
        let store = store();
        let mut p = processor(ImportType::Archive);

        p.process(&store, &archive_row("أحمد", "ملف 1", Some("نموذج 1")))
            .unwrap();
        let mark = p.mark_row();
        p.process(&store, &archive_row("سعيد", "ملف 2", Some("نموذج 2-3")))
            .unwrap();
        p.undo_row(mark);

        p.flush_files(&store).unwrap();
        p.commit_chunk();
        assert_eq!(count(&store, "archive_file"), 1);
        assert_eq!(p.files_created(), 1);

        // 撤销后同一行可重新排队
        p.process(&store, &archive_row("سعيد", "ملف 2", Some("نموذج 2-3")))
            .unwrap();
        p.flush_files(&store).unwrap();
        assert_eq!(count(&store, "archive_file"), 3);
    }
}
