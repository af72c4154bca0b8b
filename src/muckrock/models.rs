// MuckRock API models
// Fields the API may omit are explicit Options with serde defaults

use serde::{Deserialize, Serialize};

/// Paginated list response
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// A FOIA request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FoiaRequest {
    pub id: u64,
    pub title: String,
    pub status: String,
    pub slug: Option<String>,
    pub agency: Option<u64>,
    pub user: Option<u64>,
    pub requested_docs: Option<String>,
    pub datetime_submitted: Option<String>,
    pub datetime_done: Option<String>,
    pub price: Option<String>,
    pub absolute_url: Option<String>,
}

/// A message exchanged on a FOIA request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Communication {
    pub id: u64,
    pub foia: Option<u64>,
    pub from_user: Option<u64>,
    pub to_user: Option<u64>,
    pub subject: Option<String>,
    pub datetime: Option<String>,
    pub response: Option<bool>,
    pub communication: Option<String>,
    pub files: Vec<FileAttachment>,
}

/// A file released on a communication
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAttachment {
    pub id: Option<u64>,
    pub title: Option<String>,
    pub ffile: Option<String>,
    pub datetime: Option<String>,
    pub pages: Option<u32>,
}

/// A government agency
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Agency {
    pub id: u64,
    pub name: String,
    pub slug: Option<String>,
    pub status: Option<String>,
    pub jurisdiction: Option<u64>,
    pub average_response_time: Option<f64>,
    pub fee_rate: Option<f64>,
    pub success_rate: Option<f64>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
}

/// A jurisdiction (federal, state or local)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Jurisdiction {
    pub id: u64,
    pub name: String,
    pub abbrev: Option<String>,
    pub level: Option<String>,
    pub parent: Option<u64>,
}

/// The authenticated user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

/// An organization a user can file under
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Organization {
    pub id: u64,
    pub name: String,
    pub slug: Option<String>,
    pub private: Option<bool>,
    pub individual: Option<bool>,
    pub monthly_requests: Option<u32>,
    pub number_requests: Option<u32>,
}

/// Filters for listing requests
#[derive(Debug, Clone, Default)]
pub struct RequestQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub user: Option<u64>,
    pub limit: usize,
}

impl RequestQuery {
    pub fn search(query: impl Into<String>, limit: usize) -> Self {
        Self {
            search: Some(query.into()),
            limit,
            ..Default::default()
        }
    }
}

/// Body for filing a new request
#[derive(Debug, Clone, Serialize)]
pub struct NewRequest {
    pub title: String,
    pub requested_docs: String,
    pub agencies: Vec<u64>,
    pub organization: u64,
    pub embargo: bool,
    pub permanent_embargo: bool,
    pub request_fee_waiver: bool,
}

/// Result of filing a request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreatedRequest {
    pub status: Option<String>,
    pub location: Option<String>,
    pub requests: Vec<u64>,
}

/// Body for a follow-up or appeal message
#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub communication: String,
}
