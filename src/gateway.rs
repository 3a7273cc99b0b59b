use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use crate::session::file_name;
use std::path::PathBuf;

/// The backend refuses more than this many files per upload.
pub const MAX_UPLOAD_FILES: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Network error during {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Backend returned {status} for {operation}")]
    Status {
        operation: &'static str,
        status: StatusCode,
    },

    #[error("Could not decode {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Could not read {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Only up to {max} files can be uploaded at a time (got {count})")]
    TooManyFiles { count: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct QueryResponse {
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct UploadResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Thin client over the four backend endpoints. Cloning shares the
/// underlying connection pool.
#[derive(Debug, Clone)]
pub struct Gateway {
    client: Client,
    base_url: String,
}

impl Gateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn query(&self, text: &str) -> Result<QueryResponse> {
        const OP: &str = "query";
        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .json(&QueryRequest { query: text })
            .send()
            .await
            .map_err(|source| GatewayError::Transport { operation: OP, source })?;

        decode_json(OP, response).await
    }

    pub async fn upload(&self, files: &[PathBuf]) -> Result<UploadResponse> {
        const OP: &str = "upload";
        if files.len() > MAX_UPLOAD_FILES {
            return Err(GatewayError::TooManyFiles {
                count: files.len(),
                max: MAX_UPLOAD_FILES,
            });
        }

        let mut form = Form::new();
        for path in files {
            let data = tokio::fs::read(path)
                .await
                .map_err(|source| GatewayError::ReadFile {
                    path: path.clone(),
                    source,
                })?;
            form = form.part("files", Part::bytes(data).file_name(file_name(path)));
        }

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|source| GatewayError::Transport { operation: OP, source })?;

        decode_json(OP, response).await
    }

    pub async fn list_files(&self) -> Result<Vec<String>> {
        const OP: &str = "list files";
        let response = self
            .client
            .get(format!("{}/files", self.base_url))
            .send()
            .await
            .map_err(|source| GatewayError::Transport { operation: OP, source })?;

        let files: Option<Vec<String>> = decode_json(OP, response).await?;
        Ok(files.unwrap_or_default())
    }

    pub async fn download(&self, name: &str) -> Result<Bytes> {
        const OP: &str = "download";
        let response = self
            .client
            .get(format!(
                "{}/download/{}",
                self.base_url,
                urlencoding::encode(name)
            ))
            .send()
            .await
            .map_err(|source| GatewayError::Transport { operation: OP, source })?;

        let response = check_status(OP, response)?;
        response
            .bytes()
            .await
            .map_err(|source| GatewayError::Transport { operation: OP, source })
    }
}

fn check_status(operation: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::Status { operation, status });
    }
    Ok(response)
}

async fn decode_json<T: DeserializeOwned>(operation: &'static str, response: Response) -> Result<T> {
    check_status(operation, response)?
        .json::<T>()
        .await
        .map_err(|source| GatewayError::Decode { operation, source })
}
