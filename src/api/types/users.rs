use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct UsersRegisterArg {
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

#[derive(Debug, Deserialize)]
pub struct UsersRegisterResult {
    #[serde(rename = "userID")]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct UsersGetPublicKeyArg {
    #[serde(rename = "userID")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UsersGetPublicKeyResult {
    #[serde(rename = "userID", default)]
    pub user_id: Option<String>,
    /// Identities registered without a key come back as `null`.
    #[serde(rename = "publicKey")]
    pub public_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UsersSearchArg {
    pub data_search: String,
}

pub type UsersSearchResult = Vec<UserEntry>;

#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "publicKey")]
    pub public_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UsersDeleteArg {
    #[serde(rename = "userID")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UsersDeleteResult {
    #[serde(rename = "userID")]
    pub user_id: String,
}
