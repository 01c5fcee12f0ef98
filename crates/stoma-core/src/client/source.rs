//! Where the client shells get their data from.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use stoma_db::models::{CarePlanItem, EducationArticle, PlanDetail};

use super::ClientContext;

/// Errors surfaced to the client shells.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("server returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),
}

/// Read and write access to care plan data for the client shells.
#[async_trait]
pub trait CarePlanSource: Send + Sync {
    /// The active plan of a patient with its ordered items.
    ///
    /// Fails with [`ClientError::NotFound`] when the patient has none.
    async fn fetch_active_plan(&self, patient_id: i64) -> Result<PlanDetail, ClientError>;

    /// Write an item's completion flag and return the stored item.
    async fn set_item_completed(
        &self,
        item_id: i64,
        completed: bool,
    ) -> Result<CarePlanItem, ClientError>;

    /// Education articles, optionally restricted to one category.
    async fn list_articles(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<EducationArticle>, ClientError>;
}

/// [`CarePlanSource`] backed by the HTTP API.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Finish `builder`, falling back to a default client when the TLS backend
/// or a header value is rejected. The fallback has no request timeout.
fn build_http_client(builder: reqwest::ClientBuilder) -> reqwest::Client {
    match builder.build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "http client setup failed; using defaults without timeout");
            reqwest::Client::new()
        }
    }
}

impl HttpSource {
    /// Build a source for the API and session of `ctx`.
    pub fn new(ctx: &ClientContext) -> Self {
        let http = build_http_client(
            reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent(concat!("stoma-client/", env!("CARGO_PKG_VERSION"))),
        );

        Self {
            base_url: ctx.config.api_base_url.trim_end_matches('/').to_owned(),
            token: ctx.token().map(str::to_owned),
            http,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/api{path}", self.base_url);
        debug!(%method, %url, "api request");
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Transport(format!("invalid response body: {e}")))
    }
}

/// Map a non-success response to a [`ClientError`], keeping the server's
/// error message when it sent one.
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or_else(|_| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("error").to_owned()
            } else {
                text
            }
        });

    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
        other => ClientError::Http {
            status: other.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl CarePlanSource for HttpSource {
    async fn fetch_active_plan(&self, patient_id: i64) -> Result<PlanDetail, ClientError> {
        let path = format!("/patients/{patient_id}/care-plan");
        self.send(self.request(Method::GET, &path)).await
    }

    async fn set_item_completed(
        &self,
        item_id: i64,
        completed: bool,
    ) -> Result<CarePlanItem, ClientError> {
        let path = format!("/care-plan-items/{item_id}");
        let builder = self
            .request(Method::PATCH, &path)
            .json(&serde_json::json!({ "completed": completed }));
        self.send(builder).await
    }

    async fn list_articles(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<EducationArticle>, ClientError> {
        let mut builder = self.request(Method::GET, "/education");
        if let Some(category) = category {
            builder = builder.query(&[("category", category)]);
        }
        self.send(builder).await
    }
}
