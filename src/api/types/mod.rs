use serde::Deserialize;

pub mod files;
pub mod users;

/// Body the server sends with every non-success status.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub description: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub http_error_code: Option<u16>,
}
