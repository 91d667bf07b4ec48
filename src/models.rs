use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============ Domain Models ============

/// A lead row scraped from the CRM lead list.
///
/// Leads are rebuilt from every poll response and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    /// Stable lead identifier shown in the first column.
    pub id: String,
    /// Opaque value the CRM requires to claim the lead.
    pub allocation_token: String,
    /// Inner markup of the row the lead was parsed from.
    pub raw_fragment: String,
}

impl Lead {
    pub fn new(
        id: impl Into<String>,
        allocation_token: impl Into<String>,
        raw_fragment: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            allocation_token: allocation_token.into(),
            raw_fragment: raw_fragment.into(),
        }
    }
}

/// Authenticated session against the CRM.
///
/// Built once at startup and treated as immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Session {
    pub base_url: String,
    /// CSRF token sent alongside allocation and login forms.
    pub auth_token: String,
    /// Raw `Cookie` header value.
    pub cookie: String,
    pub user_id: Option<u64>,
    pub customer_id: Option<u64>,
}

impl Session {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

// ============ Allocation API ============

/// Form body for the batch allocation endpoint.
///
/// Serialized as repeated `checkList[]` fields followed by the session identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub check_list: Vec<String>,
    pub user_id: String,
    pub customer_id: String,
    pub csrf_token: String,
}

impl AllocationRequest {
    pub fn new(leads: &[Lead], session: &Session) -> Self {
        Self {
            check_list: leads
                .iter()
                .map(|lead| lead.allocation_token.clone())
                .collect(),
            user_id: session.user_id.map(|id| id.to_string()).unwrap_or_default(),
            customer_id: session
                .customer_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            csrf_token: session.auth_token.clone(),
        }
    }

    /// Ordered form fields, ready for `reqwest::RequestBuilder::form`.
    pub fn form_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields: Vec<(&'static str, &str)> = self
            .check_list
            .iter()
            .map(|token| ("checkList[]", token.as_str()))
            .collect();
        fields.push(("user_id", self.user_id.as_str()));
        fields.push(("customer_id", self.customer_id.as_str()));
        fields.push(("csrf_token", self.csrf_token.as_str()));
        fields
    }
}

/// JSON body returned by the allocation endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AllocationResponse {
    /// Error indicator; any truthy value means the batch failed.
    #[serde(default)]
    pub err: Option<Value>,
}

impl AllocationResponse {
    /// Error message if the response carries a truthy `err` field.
    pub fn error_message(&self) -> Option<String> {
        let err = self.err.as_ref()?;
        if !is_truthy(err) {
            return None;
        }
        Some(match err {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Result of one allocation batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationReceipt {
    /// Identifiers of the leads claimed by the batch.
    pub lead_ids: Vec<String>,
    pub allocated_at: DateTime<Utc>,
}
