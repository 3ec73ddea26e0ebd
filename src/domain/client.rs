// ==========================================
// 档案批量导入引擎 - 客户模型
// ==========================================
// 职责: 客户实体 + 导入草稿
// 自然键: 标准化后的 name（所有导入模式一致）
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Client - 客户
// ==========================================
// files_code: 该客户在各行中出现过的文件编号，只追加、去重
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub national_id: Option<String>,
    pub client_code: String,
    pub telephone: Option<String>,
    pub mobile: Option<String>,
    pub notes: Option<String>,
    pub excel_row_number: Option<i64>,
    pub files_code: Vec<String>,
}

impl Client {
    /// 是否已记录该文件编号
    pub fn has_file_code(&self, code: &str) -> bool {
        self.files_code.iter().any(|c| c == code)
    }
}

// ==========================================
// ClientDraft - 从一行数据提取的客户属性
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDraft {
    pub name: String,
    pub national_id: Option<String>,
    pub client_code: Option<String>,
    pub telephone: Option<String>,
    pub mobile: Option<String>,
    pub notes: Option<String>,
    pub excel_row_number: Option<i64>,
}

impl ClientDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 草稿中是否带有可合并到已有客户上的属性
    pub fn has_attributes(&self) -> bool {
        self.national_id.is_some()
            || self.client_code.is_some()
            || self.telephone.is_some()
            || self.mobile.is_some()
            || self.notes.is_some()
    }

    /// 合并后是否与已有客户不同
    pub fn differs_from(&self, client: &Client) -> bool {
        fn changed(new: &Option<String>, old: &Option<String>) -> bool {
            matches!(new, Some(v) if old.as_ref() != Some(v))
        }

        changed(&self.national_id, &client.national_id)
            || matches!(&self.client_code, Some(c) if *c != client.client_code)
            || changed(&self.telephone, &client.telephone)
            || changed(&self.mobile, &client.mobile)
            || changed(&self.notes, &client.notes)
    }
}

/// 生成客户编码（表格未提供时）
pub fn generate_client_code() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("CL{}", &raw[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client {
            id: 1,
            name: "أحمد محمد".to_string(),
            national_id: Some("123".to_string()),
            client_code: "CL-1".to_string(),
            telephone: None,
            mobile: None,
            notes: None,
            excel_row_number: Some(2),
            files_code: vec!["7".to_string()],
        }
    }

    #[test]
    fn test_draft_differs() {
        let mut draft = ClientDraft::named("أحمد محمد");
        assert!(!draft.differs_from(&client()));

        draft.national_id = Some("123".to_string());
        assert!(!draft.differs_from(&client()));

        draft.mobile = Some("0100".to_string());
        assert!(draft.differs_from(&client()));
    }

    #[test]
    fn test_generated_client_code() {
        let code = generate_client_code();
        assert!(code.starts_with("CL"));
        assert_eq!(code.len(), 12);
    }

    #[test]
    fn test_has_file_code() {
        assert!(client().has_file_code("7"));
        assert!(!client().has_file_code("8"));
    }
}
