//! HTTP client for the Taskboard server

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::messages::{
    AccessToken, ErrorBody, LoginRequest, LoginResponse, NewTask, NewUser, RefreshRequest, Task,
    TaskReport, TaskUpdate, User,
};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid server URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Client for the Taskboard HTTP API
pub struct TaskboardClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl TaskboardClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        // Relative joins need the trailing slash to keep any path prefix
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            token,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self.authorized(builder).send().await?;
        check_status(response).await
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        Ok(self.send(builder).await?.json().await?)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let request = self
            .client
            .post(self.url("users/login")?)
            .json(&LoginRequest { username, password });
        self.fetch(request).await
    }

    pub async fn refresh(&self, refresh: &str) -> Result<AccessToken> {
        let request = self
            .client
            .post(self.url("users/token/refresh")?)
            .json(&RefreshRequest { refresh });
        self.fetch(request).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.send(self.client.post(self.url("users/logout")?)).await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<User> {
        self.fetch(self.client.get(self.url("users/me")?)).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.fetch(self.client.get(self.url("users")?)).await
    }

    pub async fn list_admins(&self) -> Result<Vec<User>> {
        self.fetch(self.client.get(self.url("users/admins")?)).await
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<User> {
        self.fetch(self.client.post(self.url("users")?).json(user)).await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.fetch(self.client.get(self.url("tasks")?)).await
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Task> {
        let request = self.client.get(self.url(&format!("tasks/{}", id))?);
        self.fetch(request).await
    }

    pub async fn create_task(&self, task: &NewTask) -> Result<Task> {
        self.fetch(self.client.post(self.url("tasks")?).json(task)).await
    }

    pub async fn update_task(&self, id: Uuid, update: &TaskUpdate) -> Result<Task> {
        let request = self
            .client
            .patch(self.url(&format!("tasks/{}", id))?)
            .json(update);
        self.fetch(request).await
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<()> {
        let request = self.client.delete(self.url(&format!("tasks/{}", id))?);
        self.send(request).await?;
        Ok(())
    }

    pub async fn report(&self, id: Uuid) -> Result<TaskReport> {
        let request = self.client.get(self.url(&format!("tasks/{}/report", id))?);
        self.fetch(request).await
    }
}

/// Map a non-success response onto [`ClientError`]
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
    let message = body
        .as_ref()
        .map(|b| b.error.clone())
        .unwrap_or_else(|| text.clone());

    tracing::debug!("{} - {}", status, text);

    Err(match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
        StatusCode::FORBIDDEN => ClientError::PermissionDenied(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::BAD_REQUEST => ClientError::Validation {
            field: body
                .and_then(|b| b.field)
                .unwrap_or_else(|| "request".to_string()),
            message,
        },
        _ => ClientError::Server {
            status: status.as_u16(),
            message,
        },
    })
}
