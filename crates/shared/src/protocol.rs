//! Wire formats of the external identity and document services.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Record, SessionInfo};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSignInRequest {
    pub email: String,
    pub password: String,
    pub return_secure_token: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSignInResponse {
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<String>,
}

impl PasswordSignInResponse {
    /// Accounts without a profile name fall back to their email, then to
    /// the bare account id.
    pub fn into_session_info(self) -> SessionInfo {
        let display_name = self
            .display_name
            .filter(|name| !name.is_empty())
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.local_id.clone());
        SessionInfo {
            display_name,
            identity_key: self.local_id,
            email: self.email,
            signed_in_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name, `projects/{p}/databases/{d}/documents/{collection}/{id}`.
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    /// int64 values travel as decimal strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integer_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub double_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_value: Option<String>,
}

impl FieldValue {
    /// Text shown in a table cell. Maps, arrays and nulls have none.
    pub fn as_text(&self) -> Option<String> {
        if let Some(v) = &self.string_value {
            return Some(v.clone());
        }
        if let Some(v) = &self.integer_value {
            return Some(v.clone());
        }
        if let Some(v) = self.double_value {
            return Some(v.to_string());
        }
        if let Some(v) = self.boolean_value {
            return Some(v.to_string());
        }
        self.timestamp_value.clone()
    }
}

impl Document {
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(FieldValue::as_text)
    }

    pub fn to_record(&self) -> Record {
        Record {
            id: self.id().to_string(),
            bloom: self.text("bloom"),
            first_name: self.text("first_name"),
            song: self.text("song"),
            year: self.text("year"),
        }
    }
}
