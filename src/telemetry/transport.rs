/// HTTP access to the metric sources

use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::FetchError;

/// GET a JSON body from a source path under a cancellation scope.
///
/// Implementations must resolve to `FetchError::Cancelled` once `scope` is
/// cancelled rather than finishing the request.
pub trait Transport: Send + Sync {
    fn get_json(&self, path: &str, scope: &CancellationToken) -> BoxFuture<'static, Result<Value, FetchError>>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn request(client: Client, url: String) -> Result<Value, FetchError> {
    let response = client
        .get(&url)
        .header("Accept", "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| FetchError::Malformed(e.to_string()))
}

impl Transport for HttpTransport {
    fn get_json(&self, path: &str, scope: &CancellationToken) -> BoxFuture<'static, Result<Value, FetchError>> {
        let client = self.client.clone();
        let url = self.url_for(path);
        let scope = scope.clone();

        async move {
            tokio::select! {
                biased;
                _ = scope.cancelled() => Err(FetchError::Cancelled),
                result = request(client, url) => result,
            }
        }
        .boxed()
    }
}

/// Unwrap the `{ success, data, error }` envelope every source answers with
pub fn unwrap_envelope(body: Value) -> Result<Value, FetchError> {
    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !success {
        let reason = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("success flag not set")
            .to_string();
        return Err(FetchError::Rejected(reason));
    }

    match body {
        Value::Object(mut map) => Ok(map.remove("data").unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}
