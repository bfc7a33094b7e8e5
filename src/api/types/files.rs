use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct FilesUploadResult {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct FilesDownloadArg {
    pub file_id: String,
}

/// Envelope bytes as stored on the server, with the name they were uploaded
/// under.
#[derive(Debug)]
pub struct DownloadedFile {
    pub file_name: String,
    pub contents: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub struct FilesListResult {
    pub num_files: u64,
    pub files_list: Vec<FileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileEntry {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileID")]
    pub file_id: String,
}

#[derive(Debug, Serialize)]
pub struct FilesDeleteArg {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FilesDeleteResult {
    pub file_id: String,
}
