//! Thin HTTP client for the Delay Watch API.

use anyhow::{bail, Context, Result};
use serde_json::Value;

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;
        Self::unwrap_data(response).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;
        Self::unwrap_data(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    /// Return the `data` payload, or fail with the server's error message.
    async fn unwrap_data(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("invalid JSON in {status} response"))?;

        if !status.is_success() {
            let message = body["error"].as_str().unwrap_or("request failed");
            let code = body["code"].as_str().unwrap_or("UNKNOWN");
            bail!("{status} {code}: {message}");
        }

        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_data_payload() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/monitors")
            .with_status(200)
            .with_body(r#"{"data":[{"instance_id":"delivery-a-2026-10-19"}]}"#)
            .create_async()
            .await;

        let data = ApiClient::new(&server.url()).get("/monitors").await.unwrap();

        assert_eq!(data[0]["instance_id"], "delivery-a-2026-10-19");
    }

    #[tokio::test]
    async fn error_response_becomes_error_with_server_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/monitors/x/check-now")
            .with_status(404)
            .with_body(r#"{"error":"Monitor instance x not found","code":"NOT_FOUND"}"#)
            .create_async()
            .await;

        let err = ApiClient::new(&server.url())
            .post("/monitors/x/check-now", None)
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("NOT_FOUND"));
        assert!(message.contains("Monitor instance x not found"));
    }
}
