// ==========================================
// 档案批量导入引擎 - 层级实体解析器
// ==========================================
// 职责: 11 类实体的幂等 get-or-create（带进程内缓存）
// - 层级节点: 键 (kind, parent_id, 规范化名称)
// - 客户: 键 规范化名称
// - 土地: 键 (client_id, land_no, governorate_id)
// 缓存: 运行开始前一次性预加载；运行结束后释放
// 块日志: 块回滚时撤销该块内写入缓存的条目
// ==========================================

use crate::domain::client::{Client, ClientDraft};
use crate::domain::hierarchy::{normalize_name, Node};
use crate::domain::land::{Land, LandDraft, LandKey};
use crate::domain::types::NodeKind;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::import_store::ImportStore;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub const CLIENT_KIND: &str = "client";
pub const LAND_KIND: &str = "land";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    kind: NodeKind,
    parent_id: Option<i64>,
    name: String,
}

/// 块内缓存变更（用于回滚撤销）
#[derive(Debug)]
enum JournalEntry {
    Node(NodeKey),
    ClientInserted(String),
    ClientReplaced(Client),
    LandInserted(LandKey),
    LandReplaced(Land),
}

/// 行级撤销点（日志长度 + 未提交计数）
#[derive(Debug, Clone)]
pub struct ResolverMark {
    journal_len: usize,
    pending_created: BTreeMap<String, usize>,
}

// ==========================================
// EntityResolver
// ==========================================
#[derive(Debug, Default)]
pub struct EntityResolver {
    nodes: HashMap<NodeKey, Node>,
    clients: HashMap<String, Client>,
    lands: HashMap<LandKey, Land>,
    update_existing: bool,

    journal: Vec<JournalEntry>,
    created: BTreeMap<String, usize>,
    pending_created: BTreeMap<String, usize>,
}

impl EntityResolver {
    pub fn new(update_existing: bool) -> Self {
        Self {
            update_existing,
            ..Default::default()
        }
    }

    /// 批量预加载（把 O(行数 × 层级) 点查询压缩为一次快照读取）
    pub fn preload(&mut self, store: &dyn ImportStore) -> ImportResult<()> {
        let snapshot = store.load_snapshot()?;

        for node in snapshot.nodes {
            let key = NodeKey {
                kind: node.kind,
                parent_id: node.parent_id,
                name: node.name.clone(),
            };
            self.nodes.insert(key, node);
        }
        for client in snapshot.clients {
            self.clients.insert(client.name.clone(), client);
        }
        for land in snapshot.lands {
            self.lands.insert(land.key(), land);
        }

        debug!(
            nodes = self.nodes.len(),
            clients = self.clients.len(),
            lands = self.lands.len(),
            "实体缓存预加载完成"
        );
        Ok(())
    }

    // ==========================================
    // 层级节点
    // ==========================================

    /// 通用节点解析（名称必填；非根节点要求上级）
    pub fn node(
        &mut self,
        store: &dyn ImportStore,
        kind: NodeKind,
        parent: Option<&Node>,
        name: Option<&str>,
    ) -> ImportResult<Node> {
        let name = name
            .and_then(normalize_name)
            .ok_or_else(|| ImportError::missing(kind.table()))?;

        let parent_id = match (kind.parent(), parent) {
            (None, _) => None,
            (Some(_), Some(p)) => Some(p.id),
            (Some(parent_kind), None) => {
                return Err(ImportError::MissingParent {
                    kind: kind.to_string(),
                    parent: parent_kind.to_string(),
                })
            }
        };

        let key = NodeKey {
            kind,
            parent_id,
            name,
        };
        if let Some(node) = self.nodes.get(&key) {
            return Ok(node.clone());
        }

        let (node, created) = store.get_or_create_node(kind, parent_id, &key.name)?;
        if created {
            self.count_created(kind.table());
        }
        self.journal.push(JournalEntry::Node(key.clone()));
        self.nodes.insert(key, node.clone());
        Ok(node)
    }

    /// 可选层级: 名称或上级缺失 → None（不报错）
    pub fn optional_node(
        &mut self,
        store: &dyn ImportStore,
        kind: NodeKind,
        parent: Option<&Node>,
        name: Option<&str>,
    ) -> ImportResult<Option<Node>> {
        if name.and_then(normalize_name).is_none() {
            return Ok(None);
        }
        if kind.parent().is_some() && parent.is_none() {
            return Ok(None);
        }
        self.node(store, kind, parent, name).map(Some)
    }

    pub fn governorate(
        &mut self,
        store: &dyn ImportStore,
        name: Option<&str>,
    ) -> ImportResult<Node> {
        self.node(store, NodeKind::Governorate, None, name)
    }

    pub fn city(
        &mut self,
        store: &dyn ImportStore,
        governorate: &Node,
        name: Option<&str>,
    ) -> ImportResult<Node> {
        self.node(store, NodeKind::City, Some(governorate), name)
    }

    pub fn room(&mut self, store: &dyn ImportStore, name: Option<&str>) -> ImportResult<Node> {
        self.node(store, NodeKind::Room, None, name)
    }

    // ==========================================
    // 客户
    // ==========================================

    /// 客户解析（名称必填）
    ///
    /// # 参数
    /// - file_code: 本行文件编号，未记录过则追加到 files_code 并立即持久化
    pub fn client(
        &mut self,
        store: &dyn ImportStore,
        mut draft: ClientDraft,
        file_code: Option<&str>,
    ) -> ImportResult<Client> {
        let name =
            normalize_name(&draft.name).ok_or_else(|| ImportError::missing("owner_name"))?;
        draft.name = name.clone();

        let mut client = match self.clients.get(&name).cloned() {
            Some(existing) => {
                if self.update_existing && draft.differs_from(&existing) {
                    let updated = store.update_client(existing.id, &draft)?;
                    self.journal.push(JournalEntry::ClientReplaced(existing));
                    self.clients.insert(name.clone(), updated.clone());
                    updated
                } else {
                    existing
                }
            }
            None => {
                let (mut client, created) = store.get_or_create_client(&draft)?;
                if created {
                    self.count_created(CLIENT_KIND);
                } else if self.update_existing && draft.differs_from(&client) {
                    // 并发运行刚创建的客户
                    client = store.update_client(client.id, &draft)?;
                }
                self.journal.push(JournalEntry::ClientInserted(name.clone()));
                self.clients.insert(name.clone(), client.clone());
                client
            }
        };

        if let Some(code) = file_code.and_then(normalize_name) {
            if !client.has_file_code(&code) {
                let previous = client.clone();
                client.files_code.push(code);
                store.set_client_files_code(client.id, &client.files_code)?;
                self.journal.push(JournalEntry::ClientReplaced(previous));
                self.clients.insert(name, client.clone());
            }
        }

        Ok(client)
    }

    // ==========================================
    // 土地
    // ==========================================

    /// 土地解析（同键复用；update_existing 时合并新属性）
    pub fn land(&mut self, store: &dyn ImportStore, mut draft: LandDraft) -> ImportResult<Land> {
        draft.land_no =
            normalize_name(&draft.land_no).ok_or_else(|| ImportError::missing("land_no"))?;
        let key = draft.key();

        if let Some(existing) = self.lands.get(&key).cloned() {
            if self.update_existing && draft.differs_from(&existing) {
                let updated = store.update_land(existing.id, &draft)?;
                self.journal.push(JournalEntry::LandReplaced(existing));
                self.lands.insert(key, updated.clone());
                return Ok(updated);
            }
            return Ok(existing);
        }

        let (mut land, created) = store.get_or_create_land(&draft)?;
        if created {
            self.count_created(LAND_KIND);
        } else if self.update_existing && draft.differs_from(&land) {
            land = store.update_land(land.id, &draft)?;
        }
        self.journal.push(JournalEntry::LandInserted(key.clone()));
        self.lands.insert(key, land.clone());
        Ok(land)
    }

    // ==========================================
    // 块边界
    // ==========================================

    /// 块提交成功: 固化日志与计数
    pub fn commit_chunk(&mut self) {
        self.journal.clear();
        for (kind, n) in std::mem::take(&mut self.pending_created) {
            *self.created.entry(kind).or_insert(0) += n;
        }
    }

    /// 块回滚: 逆序撤销本块写入缓存的条目
    pub fn discard_chunk(&mut self) {
        self.rewind(0);
        self.pending_created.clear();
    }

    /// 行开始前的撤销点
    pub fn mark(&self) -> ResolverMark {
        ResolverMark {
            journal_len: self.journal.len(),
            pending_created: self.pending_created.clone(),
        }
    }

    /// 行失败: 撤销该行写入缓存的条目与新建计数
    pub fn undo_to(&mut self, mark: ResolverMark) {
        self.rewind(mark.journal_len);
        self.pending_created = mark.pending_created;
    }

    fn rewind(&mut self, journal_len: usize) {
        let undone = self.journal.split_off(journal_len.min(self.journal.len()));
        for entry in undone.into_iter().rev() {
            match entry {
                JournalEntry::Node(key) => {
                    self.nodes.remove(&key);
                }
                JournalEntry::ClientInserted(name) => {
                    self.clients.remove(&name);
                }
                JournalEntry::ClientReplaced(previous) => {
                    self.clients.insert(previous.name.clone(), previous);
                }
                JournalEntry::LandInserted(key) => {
                    self.lands.remove(&key);
                }
                JournalEntry::LandReplaced(previous) => {
                    self.lands.insert(previous.key(), previous);
                }
            }
        }
    }

    /// 已提交的新建数量（按种类）
    pub fn created_counts(&self) -> &BTreeMap<String, usize> {
        &self.created
    }

    /// 运行结束: 释放缓存
    pub fn clear(&mut self) {
        self.nodes = HashMap::new();
        self.clients = HashMap::new();
        self.lands = HashMap::new();
        self.journal = Vec::new();
        self.pending_created.clear();
    }

    pub fn cached_entities(&self) -> usize {
        self.nodes.len() + self.clients.len() + self.lands.len()
    }

    fn count_created(&mut self, kind: &str) {
        *self.pending_created.entry(kind.to_string()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::LocationPath;
    use crate::repository::import_store_impl::SqliteImportStore;
    use rusqlite::Connection;

    fn store() -> SqliteImportStore {
        SqliteImportStore::from_connection(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_same_key_resolves_once() {
        let store = store();
        let mut resolver = EntityResolver::new(false);

        let gov = resolver.governorate(&store, Some("القاهرة")).unwrap();
        let again = resolver.governorate(&store, Some("  القاهرة ")).unwrap();
        assert_eq!(gov.id, again.id);

        let c1 = resolver.city(&store, &gov, Some("المعادي")).unwrap();
        let c2 = resolver.city(&store, &gov, Some("المعادي")).unwrap();
        assert_eq!(c1.id, c2.id);

        resolver.commit_chunk();
        assert_eq!(resolver.created_counts().get("governorate"), Some(&1));
        assert_eq!(resolver.created_counts().get("city"), Some(&1));
    }

    #[test]
    fn test_required_and_optional_levels() {
        let store = store();
        let mut resolver = EntityResolver::new(false);

        assert!(matches!(
            resolver.governorate(&store, None),
            Err(ImportError::MissingRequiredField { .. })
        ));
        assert!(matches!(
            resolver.room(&store, Some("   ")),
            Err(ImportError::MissingRequiredField { .. })
        ));

        let district = resolver
            .optional_node(&store, NodeKind::District, None, Some("الحي الأول"))
            .unwrap();
        assert!(district.is_none());

        let room = resolver.room(&store, Some("غرفة 1")).unwrap();
        let lane = resolver
            .optional_node(&store, NodeKind::Lane, Some(&room), None)
            .unwrap();
        assert!(lane.is_none());
    }

    #[test]
    fn test_client_files_code_appended_once() {
        let store = store();
        let mut resolver = EntityResolver::new(false);

        resolver
            .client(&store, ClientDraft::named("أحمد"), Some("12"))
            .unwrap();
        let client = resolver
            .client(&store, ClientDraft::named("أحمد"), Some("12"))
            .unwrap();
        assert_eq!(client.files_code, vec!["12"]);

        let client = resolver
            .client(&store, ClientDraft::named("أحمد"), Some("13"))
            .unwrap();
        assert_eq!(client.files_code, vec!["12", "13"]);
    }

    #[test]
    fn test_discard_chunk_reverts_cache() {
        let store = store();
        let mut resolver = EntityResolver::new(false);

        store.begin_chunk().unwrap();
        resolver.room(&store, Some("غرفة 1")).unwrap();
        store.rollback_chunk().unwrap();
        resolver.discard_chunk();

        assert_eq!(resolver.cached_entities(), 0);
        assert!(resolver.created_counts().is_empty());

        // 回滚后重新解析会重新写库
        let room = resolver.room(&store, Some("غرفة 1")).unwrap();
        assert!(store.load_snapshot().unwrap().nodes.iter().any(|n| n.id == room.id));
    }

    #[test]
    fn test_undo_row_keeps_earlier_rows() {
        let store = store();
        let mut resolver = EntityResolver::new(false);

        resolver.room(&store, Some("غرفة 1")).unwrap();
        let mark = resolver.mark();
        resolver.room(&store, Some("غرفة 2")).unwrap();
        resolver
            .client(&store, ClientDraft::named("أحمد"), Some("7"))
            .unwrap();
        resolver.undo_to(mark);

        assert_eq!(resolver.cached_entities(), 1);
        resolver.commit_chunk();
        assert_eq!(resolver.created_counts().get("room"), Some(&1));
        assert_eq!(resolver.created_counts().get(CLIENT_KIND), None);
    }

    #[test]
    fn test_land_merge_with_update_existing() {
        let store = store();
        let mut resolver = EntityResolver::new(true);
        let client = resolver
            .client(&store, ClientDraft::named("أحمد"), None)
            .unwrap();

        let mut draft = LandDraft {
            client_id: client.id,
            land_no: "نموذج 5".to_string(),
            unit_no: None,
            location: LocationPath::default(),
        };
        let first = resolver.land(&store, draft.clone()).unwrap();

        draft.unit_no = Some("12".to_string());
        let merged = resolver.land(&store, draft).unwrap();

        assert_eq!(first.id, merged.id);
        assert_eq!(merged.unit_no.as_deref(), Some("12"));
    }

    #[test]
    fn test_preload_reuses_existing_rows() {
        let store = store();
        store
            .get_or_create_node(NodeKind::Governorate, None, "الجيزة")
            .unwrap();

        let mut resolver = EntityResolver::new(false);
        resolver.preload(&store).unwrap();
        resolver.governorate(&store, Some("الجيزة")).unwrap();
        resolver.commit_chunk();

        assert!(resolver.created_counts().is_empty());
    }
}
