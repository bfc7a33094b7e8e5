use reqwest::{
    Client, Error as ReqwestError, RequestBuilder, Response,
    header::{self, HeaderValue},
    multipart,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

use super::types::{ApiError, files, users};

/// Client for the file exchange server: the user directory (`/users/*`) and
/// the envelope transport (`/files/*`).
#[derive(Debug, Clone)]
pub struct SealClient {
    base_url: String,
    client: Client,
    token: Option<String>,
}

#[derive(Debug)]
pub enum RequestError {
    Http(ReqwestError),
    Route(ApiError),
    Unexpected(String),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Http(e) => write!(f, "HTTP Error: {}", e),
            RequestError::Route(e) => write!(f, "{}", e.description),
            RequestError::Unexpected(msg) => write!(f, "Unexpected Error: {}", msg),
        }
    }
}

impl std::error::Error for RequestError {}

impl From<ReqwestError> for RequestError {
    fn from(error: ReqwestError) -> Self {
        RequestError::Http(error)
    }
}

impl SealClient {
    /// Initializes a new SealClient with the given base URL
    pub fn new(base_url: &str) -> Self {
        SealClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            token: None,
        }
    }

    /// Sets the bearer token sent with every request
    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.trim().to_string());
    }

    /// POST builder for `endpoint` carrying the User-Agent and, when a token
    /// is set, the Authorization header.
    fn post(&self, endpoint: &str) -> Result<RequestBuilder, RequestError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut request = self.client.post(&url).header(
            header::USER_AGENT,
            HeaderValue::from_str(&format!("seal/{}", env!("CARGO_PKG_VERSION"))).map_err(
                |_| RequestError::Unexpected("Failed to construct User-Agent header".into()),
            )?,
        );

        if let Some(ref token) = self.token {
            let auth_value = format!("Bearer {}", token);
            request = request.header(
                header::AUTHORIZATION,
                HeaderValue::from_str(&auth_value).map_err(|_| {
                    RequestError::Unexpected("Failed to construct Authorization header".into())
                })?,
            );
        }
        Ok(request)
    }

    /// Sends the request and turns any non-success status into an error,
    /// using the server's `description` when it sent one.
    async fn send(&self, request: RequestBuilder) -> Result<Response, RequestError> {
        let response = request.send().await.map_err(RequestError::Http)?;
        let status = response.status();
        tracing::debug!("{} -> {}", response.url().path(), status);
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiError>(&body) {
            Ok(error) => Err(RequestError::Route(error)),
            Err(_) => Err(RequestError::Unexpected(format!(
                "Unexpected HTTP status: {}",
                status
            ))),
        }
    }

    /// Generic JSON-in, JSON-out API request
    pub async fn mk_api_request<ArgType, ResultType>(
        &self,
        endpoint: &str,
        arg: &ArgType,
    ) -> Result<ResultType, RequestError>
    where
        ArgType: Serialize + ?Sized,
        ResultType: DeserializeOwned,
    {
        let request = self.post(endpoint)?.json(arg);
        let response = self.send(request).await?;
        Ok(response.json::<ResultType>().await?)
    }

    //
    // Users
    //

    pub async fn users_register(
        &self,
        arg: users::UsersRegisterArg,
    ) -> Result<users::UsersRegisterResult, RequestError> {
        self.mk_api_request("/users/register", &arg).await
    }

    pub async fn users_get_public_key(
        &self,
        arg: users::UsersGetPublicKeyArg,
    ) -> Result<users::UsersGetPublicKeyResult, RequestError> {
        self.mk_api_request("/users/getPublicKey", &arg).await
    }

    pub async fn users_search(
        &self,
        arg: users::UsersSearchArg,
    ) -> Result<users::UsersSearchResult, RequestError> {
        self.mk_api_request("/users/search", &arg).await
    }

    pub async fn users_delete(
        &self,
        arg: users::UsersDeleteArg,
    ) -> Result<users::UsersDeleteResult, RequestError> {
        self.mk_api_request("/users/delete", &arg).await
    }

    //
    // Files
    //

    /// Uploads envelope bytes as the multipart field `ufile`.
    pub async fn files_upload(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<files::FilesUploadResult, RequestError> {
        let part = multipart::Part::bytes(contents).file_name(file_name.to_string());
        let form = multipart::Form::new().part("ufile", part);
        let response = self.send(self.post("/files/upload")?.multipart(form)).await?;
        Ok(response.json().await?)
    }

    /// Downloads raw envelope bytes. The original file name comes from the
    /// `Content-Disposition` header.
    pub async fn files_download(
        &self,
        arg: files::FilesDownloadArg,
    ) -> Result<files::DownloadedFile, RequestError> {
        let response = self
            .send(self.post("/files/download")?.json(&arg))
            .await?;
        let file_name = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_file_name)
            .ok_or_else(|| {
                RequestError::Unexpected("Download is missing its file name".to_string())
            })?;
        let contents = response.bytes().await?.to_vec();
        Ok(files::DownloadedFile {
            file_name,
            contents,
        })
    }

    pub async fn files_list(&self) -> Result<files::FilesListResult, RequestError> {
        let response = self.send(self.post("/files/list")?).await?;
        Ok(response.json().await?)
    }

    pub async fn files_delete(
        &self,
        arg: files::FilesDeleteArg,
    ) -> Result<files::FilesDeleteResult, RequestError> {
        self.mk_api_request("/files/delete", &arg).await
    }
}

/// Extracts the file name from `attachment; filename="report.pdf"`.
fn attachment_file_name(content_disposition: &str) -> Option<String> {
    content_disposition
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}
