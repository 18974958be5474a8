//! HTTP client for the directory REST API

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{Envelope, FetchError, Page, PageSource, QueryParams, RecordWriter};
use crate::config::ApiConfig;
use crate::records::Resource;

/// Thin reqwest wrapper that knows the API base URL and bearer token.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("roster/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: parse_base_url(&config.base_url)?,
            token,
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, segments: &[&str]) -> Result<Url, FetchError> {
        join_segments(&self.base_url, segments)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET the endpoint at `segments` with query pairs and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(String, String)],
    ) -> Result<T, FetchError> {
        let url = self.url(segments)?;
        tracing::debug!("GET {} {:?}", url, query);

        let response = self
            .authorize(self.client.get(url).query(query))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// POST a JSON body and decode the JSON reply
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, FetchError> {
        let url = self.url(segments)?;
        tracing::debug!("POST {}", url);

        let response = self
            .authorize(self.client.post(url).json(body))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// PATCH without a body (state transitions such as approval)
    pub async fn patch(&self, segments: &[&str]) -> Result<(), FetchError> {
        let url = self.url(segments)?;
        tracing::debug!("PATCH {}", url);

        let response = self.authorize(self.client.patch(url)).send().await?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn delete(&self, segments: &[&str]) -> Result<(), FetchError> {
        let url = self.url(segments)?;
        tracing::debug!("DELETE {}", url);

        let response = self.authorize(self.client.delete(url)).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

pub fn parse_base_url(base: &str) -> Result<Url, FetchError> {
    Url::parse(base.trim()).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", base, e)))
}

/// Append `segments` to `base`. Each segment is percent-encoded so `/`, `?`
/// and `#` inside it cannot change the endpoint.
pub fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, FetchError> {
    if let Some(bad) = segments
        .iter()
        .find(|s| matches!(s.trim(), "" | "." | ".."))
    {
        return Err(FetchError::InvalidUrl(format!("bad path segment '{}'", bad)));
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| FetchError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound);
    }

    let message = response.text().await.unwrap_or_default();
    tracing::warn!("API error ({}): {}", status, message);
    Err(FetchError::Http {
        status: status.as_u16(),
        message,
    })
}

impl PageSource for ApiClient {
    async fn fetch_page(
        &self,
        resource: Resource,
        params: &QueryParams,
    ) -> Result<Page<serde_json::Value>, FetchError> {
        self.get_json(&[resource.path()], &params.to_query()).await
    }
}

impl RecordWriter for ApiClient {
    async fn create(
        &self,
        resource: Resource,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, FetchError> {
        let created: Envelope<serde_json::Value> = self.post_json(&[resource.path()], body).await?;
        Ok(created.data)
    }

    async fn approve(&self, resource: Resource, id: &str) -> Result<(), FetchError> {
        self.patch(&[resource.path(), id, "approve"]).await
    }

    async fn remove(&self, resource: Resource, id: &str) -> Result<(), FetchError> {
        self.delete(&[resource.path(), id]).await
    }
}
