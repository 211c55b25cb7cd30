use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Settings;
use crate::error::{Result, SourceError};

/// A fetched response body together with the URL it ended up at after redirects.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: String,
    pub body: String,
}

/// Thin wrapper over a shared [`reqwest::Client`]; cloning is cheap.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .redirect(reqwest::redirect::Policy::custom(|attempt| {
                if attempt.previous().len() > 5 {
                    attempt.stop()
                } else {
                    attempt.follow()
                }
            }))
            .build()?;
        Ok(Self { client })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Sends `request` and returns the body, failing on any non-2xx status.
    pub async fn fetch(&self, request: RequestBuilder) -> Result<Fetched> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().to_string();
        debug!(%url, %status, "fetched");
        if !status.is_success() {
            return Err(SourceError::Status { status, url });
        }
        let body = response.text().await?;
        Ok(Fetched { url, body })
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let page = self.fetch(request).await?;
        Ok(serde_json::from_str(&page.body)?)
    }

    pub async fn get_text(&self, url: &str) -> Result<Fetched> {
        self.fetch(self.client.get(url)).await
    }
}
