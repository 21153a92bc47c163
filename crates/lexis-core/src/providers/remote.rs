use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, ReqwestHttpClient,
};
use crate::provider::{Provider, ProviderError, ProviderFuture};
use crate::{AnalysisPayload, Operation, Params};

/// Where and how to reach an HTTP-hosted analysis engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    /// Registered as backend `remote:<name>`.
    pub name: String,
    pub operation: Operation,
    pub url: String,
    /// Sent as a bearer token unless `api_key_header` names another header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_header: Option<String>,
}

impl RemoteEndpoint {
    pub fn backend_name(&self) -> String {
        format!("remote:{}", self.name)
    }

    fn auth(&self) -> HttpAuth {
        match (&self.api_key, &self.api_key_header) {
            (None, _) => HttpAuth::None,
            (Some(key), None) => HttpAuth::BearerToken(key.clone()),
            (Some(key), Some(header)) => HttpAuth::Header {
                name: header.clone(),
                value: key.clone(),
            },
        }
    }
}

#[derive(Serialize)]
struct RemoteCall<'a> {
    operation: Operation,
    text: &'a str,
    params: &'a Params,
}

/// Provider that POSTs `{operation, text, params}` to an endpoint and expects an
/// [`AnalysisPayload`] JSON document back.
///
/// The HTTP client is built on first use and shared by every later call.
pub struct RemoteProvider {
    endpoint: RemoteEndpoint,
    backend: String,
    timeout: Duration,
    client: OnceCell<Arc<dyn HttpClient>>,
}

impl RemoteProvider {
    pub fn new(endpoint: RemoteEndpoint, timeout: Duration) -> Self {
        Self {
            backend: endpoint.backend_name(),
            endpoint,
            timeout,
            client: OnceCell::new(),
        }
    }

    /// Use `client` instead of building a reqwest client.
    pub fn with_client(self, client: Arc<dyn HttpClient>) -> Self {
        Self {
            client: OnceCell::new_with(Some(client)),
            ..self
        }
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    async fn client(&self) -> &Arc<dyn HttpClient> {
        self.client
            .get_or_init(|| async {
                debug!(backend = %self.backend, "building http client");
                Arc::new(ReqwestHttpClient::new()) as Arc<dyn HttpClient>
            })
            .await
    }

    fn decode(&self, response: HttpResponse) -> Result<AnalysisPayload, ProviderError> {
        if !response.is_success() {
            return Err(classify_status(response.status, &response.body));
        }
        let payload: AnalysisPayload = serde_json::from_str(&response.body).map_err(|error| {
            ProviderError::internal(format!("malformed response from {}: {error}", self.backend))
        })?;
        if payload.operation() != self.endpoint.operation {
            return Err(ProviderError::internal(format!(
                "{} answered with a {} payload",
                self.backend,
                payload.operation()
            )));
        }
        Ok(payload)
    }
}

impl Debug for RemoteProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProvider")
            .field("backend", &self.backend)
            .field("url", &self.endpoint.url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Provider for RemoteProvider {
    fn backend(&self) -> &str {
        &self.backend
    }

    fn operation(&self) -> Operation {
        self.endpoint.operation
    }

    fn call<'a>(&'a self, text: &'a str, params: &'a Params) -> ProviderFuture<'a> {
        Box::pin(async move {
            let body = serde_json::to_string(&RemoteCall {
                operation: self.endpoint.operation,
                text,
                params,
            })
            .map_err(|error| ProviderError::internal(error.to_string()))?;

            let request = HttpRequest::post_json(&self.endpoint.url, body)
                .with_auth(&self.endpoint.auth())
                .with_timeout(self.timeout);
            let response = self
                .client()
                .await
                .execute(request)
                .await
                .map_err(classify_transport)?;
            self.decode(response)
        })
    }
}

fn classify_transport(error: HttpError) -> ProviderError {
    match error.kind() {
        HttpErrorKind::Timeout => ProviderError::timeout(error.message()),
        HttpErrorKind::Connect => ProviderError::connection(error.message()),
        HttpErrorKind::Other => ProviderError::unavailable(error.message()),
    }
}

fn classify_status(status: u16, body: &str) -> ProviderError {
    let detail: String = body.chars().take(200).collect();
    let message = format!("http {status}: {detail}");
    match status {
        429 => ProviderError::rate_limited(message),
        408 => ProviderError::timeout(message),
        500..=599 => ProviderError::unavailable(message),
        400 | 413 | 415 | 422 => ProviderError::invalid_input(message),
        _ => ProviderError::internal(message),
    }
}
