use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::actual::api_types::{
    Envelope, FileInfo, KeyInfo, KeyRequest, LoginData, LoginRequest, UserFile,
};
use crate::actual::crypto::BudgetKey;
use crate::actual::errors::{ActualError, DownloadFailure};
use crate::actual::import::{self, RemoteOrigin};
use crate::runner::{BudgetClient, BudgetRef, DownloadedBudget, SessionConfig};

const TOKEN_HEADER: &str = "X-ACTUAL-TOKEN";
const FILE_ID_HEADER: &str = "X-ACTUAL-FILE-ID";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for an Actual Budget sync server
pub struct ActualClient {
    http: Client,
    server: Option<Url>,
    data_dir: PathBuf,
    token: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Parse the server URL and make sure relative joins stay below its path
pub fn parse_server_url(raw: &str) -> Result<Url, ActualError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| ActualError::InvalidServerUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ActualError::InvalidServerUrl {
            url: raw.to_string(),
            message: "expected an http(s) URL".to_string(),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn read_envelope<T: DeserializeOwned>(
    endpoint: &str,
    response: Response,
) -> Result<Result<T, String>, ActualError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|source| ActualError::Network {
            endpoint: endpoint.to_string(),
            source,
        })?;

    match serde_json::from_slice::<Envelope<T>>(&body) {
        Ok(envelope) => Ok(envelope.into_data()),
        Err(e) if status.is_success() => Ok(Err(format!("malformed response: {}", e))),
        Err(_) => Ok(Err(format!("http-{}", status.as_u16()))),
    }
}

impl ActualClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("actual-budget-fetch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            server: None,
            data_dir: PathBuf::new(),
            token: None,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ActualError> {
        let server = self.server.as_ref().ok_or(ActualError::NotConnected)?;
        server
            .join(path)
            .map_err(|e| ActualError::InvalidServerUrl {
                url: server.to_string(),
                message: e.to_string(),
            })
    }

    /// Attach the session token when signed in; without one the server decides
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<Response, ActualError> {
        request.send().await.map_err(|source| ActualError::Network {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    async fn login(&mut self, password: &str) -> Result<(), ActualError> {
        let url = self.endpoint("account/login")?;
        let request = self.http.post(url.clone()).json(&LoginRequest {
            login_method: "password",
            password,
        });
        let response = self.send(url.as_str(), request).await?;

        let data: LoginData = read_envelope(url.as_str(), response)
            .await?
            .map_err(ActualError::Authentication)?;
        let token = data
            .token
            .ok_or_else(|| ActualError::Authentication("invalid-password".to_string()))?;

        tracing::info!(server = %url.origin().ascii_serialization(), "signed in");
        self.token = Some(token);
        Ok(())
    }

    /// Budget files stored on the server for this account
    pub async fn list_user_files(&self) -> Result<Vec<UserFile>, ActualError> {
        let url = self.endpoint("sync/list-user-files")?;
        let request = self.authorized(self.http.get(url.clone()));
        let response = self.send(url.as_str(), request).await?;

        read_envelope(url.as_str(), response)
            .await?
            .map_err(|reason| DownloadFailure::from_reason(&reason).into())
    }

    pub async fn get_user_file_info(&self, file_id: &str) -> Result<FileInfo, ActualError> {
        let url = self.endpoint("sync/get-user-file-info")?;
        let request = self
            .authorized(self.http.get(url.clone()))
            .header(FILE_ID_HEADER, file_id);
        let response = self.send(url.as_str(), request).await?;

        read_envelope(url.as_str(), response)
            .await?
            .map_err(|reason| DownloadFailure::from_reason(&reason).into())
    }

    pub async fn download_user_file(&self, file_id: &str) -> Result<Vec<u8>, ActualError> {
        let url = self.endpoint("sync/download-user-file")?;
        let request = self
            .authorized(self.http.get(url.clone()))
            .header(FILE_ID_HEADER, file_id);
        let response = self.send(url.as_str(), request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let reason = serde_json::from_slice::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|envelope| envelope.reason);
            tracing::warn!(status = status.as_u16(), ?reason, "download refused by server");
            return Err(reason
                .map_or(DownloadFailure::Network, |reason| {
                    DownloadFailure::from_reason(&reason)
                })
                .into());
        }

        let bytes = response.bytes().await.map_err(|source| ActualError::Network {
            endpoint: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    /// Fetch the key material for an encrypted file and validate the password against it.
    pub async fn load_key(&self, file_id: &str, password: &str) -> Result<BudgetKey, ActualError> {
        let url = self.endpoint("sync/user-get-key")?;
        let request = self.authorized(self.http.post(url.clone())).json(&KeyRequest {
            token: self.token.as_deref(),
            file_id,
        });
        let response = self.send(url.as_str(), request).await?;

        let info: KeyInfo = read_envelope(url.as_str(), response)
            .await?
            .map_err(|reason| ActualError::from(DownloadFailure::from_reason(&reason)))?;
        let test = info
            .test
            .as_deref()
            .ok_or_else(|| DownloadFailure::Server("old-key-style".to_string()))?;

        let key = BudgetKey::derive(&info.id, password, &info.salt);
        key.verify(test, file_id)?;
        tracing::debug!(key_id = %key.id(), "budget key loaded");
        Ok(key)
    }
}

impl BudgetClient for ActualClient {
    async fn init(&mut self, config: &SessionConfig) -> Result<()> {
        let raw = non_empty(config.server_url.as_ref()).ok_or(ActualError::MissingServerUrl)?;
        self.server = Some(parse_server_url(raw)?);
        self.token = None;

        std::fs::create_dir_all(&config.data_dir).map_err(ActualError::from)?;
        self.data_dir = config.data_dir.clone();

        match non_empty(config.password.as_ref()) {
            Some(password) => self.login(password).await?,
            None => tracing::warn!("no account password configured, skipping sign-in"),
        }
        Ok(())
    }

    async fn download_budget(&mut self, budget: &BudgetRef) -> Result<DownloadedBudget> {
        let budget_id = non_empty(budget.budget_id.as_ref()).ok_or(ActualError::MissingBudgetId)?;

        let files = self.list_user_files().await?;
        let file = files
            .into_iter()
            .find(|f| !f.deleted && f.group_id.as_deref() == Some(budget_id))
            .ok_or_else(|| ActualError::BudgetNotFound(budget_id.to_string()))?;
        tracing::info!(file_id = %file.file_id, name = %file.name, "found remote budget");

        let key = match &file.encrypt_key_id {
            Some(_) => {
                let password = non_empty(budget.budget_password.as_ref())
                    .ok_or_else(|| ActualError::PasswordRequired(file.name.clone()))?;
                Some(self.load_key(&file.file_id, password).await?)
            }
            None => None,
        };

        let info = self.get_user_file_info(&file.file_id).await?;
        let mut bytes = self.download_user_file(&file.file_id).await?;
        tracing::debug!(size = bytes.len(), "budget file downloaded");

        if let Some(meta) = &info.encrypt_meta {
            let key = key.as_ref().ok_or_else(|| DownloadFailure::DecryptFailure {
                file_id: file.file_id.clone(),
            }).map_err(ActualError::from)?;
            bytes = key
                .decrypt(&bytes, meta, &file.file_id)
                .map_err(ActualError::from)?;
        }

        let origin = RemoteOrigin {
            file_id: &file.file_id,
            group_id: info.group_id.as_deref().unwrap_or(budget_id),
            encrypt_key_id: info.encrypt_meta.as_ref().and_then(|m| m.key_id.as_deref()),
        };
        let downloaded = import::import_budget(&self.data_dir, &origin, &bytes)?;
        Ok(downloaded)
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.token.take().is_some() || self.server.is_some() {
            tracing::debug!("session released");
        }
        self.server = None;
        Ok(())
    }
}
