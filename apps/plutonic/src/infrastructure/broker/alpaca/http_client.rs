//! Single-shot HTTP client for the Alpaca trading API.

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::api_types::AlpacaErrorResponse;
use super::config::AlpacaConfig;
use super::error::AlpacaError;

/// HTTP client for the Alpaca API. Each call sends exactly one request.
#[derive(Debug, Clone)]
pub struct AlpacaHttpClient {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
}

impl AlpacaHttpClient {
    /// Create a new HTTP client from config.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` when either credential is empty.
    pub fn new(config: &AlpacaConfig) -> Result<Self, AlpacaError> {
        if config.api_key.trim().is_empty() || config.api_secret.trim().is_empty() {
            return Err(AlpacaError::AuthenticationFailed(
                "API key and secret are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AlpacaError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            base_url: config.trading_base_url().trim_end_matches('/').to_string(),
        })
    }

    /// GET a JSON resource.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AlpacaError> {
        self.request(Method::GET, path, None::<&()>).await
    }

    /// POST a JSON body.
    #[allow(clippy::future_not_send)]
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AlpacaError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// DELETE a resource, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<(), AlpacaError> {
        let _: serde_json::Value = self.request(Method::DELETE, path, None::<&()>).await?;
        Ok(())
    }

    #[allow(clippy::future_not_send)]
    async fn request<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, AlpacaError> {
        let url = format!("{}{path}", self.base_url);

        let mut request = self
            .client
            .request(method, &url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AlpacaError::Network(e.to_string()))?;

        let status = response.status();

        if status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| AlpacaError::Network(e.to_string()))?;
            let text = if text.trim().is_empty() { "null" } else { text.as_str() };
            return serde_json::from_str(text)
                .map_err(|e| AlpacaError::InvalidResponse(e.to_string()));
        }

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let error_body = response.text().await.unwrap_or_default();

        let (code, message) = match serde_json::from_str::<AlpacaErrorResponse>(&error_body) {
            Ok(err) => (
                err.code
                    .map_or_else(|| status.as_u16().to_string(), |c| c.to_string()),
                err.message,
            ),
            Err(_) => (status.as_u16().to_string(), error_body),
        };

        Err(classify_status(status, path, code, message, retry_after))
    }
}

/// Map a non-success status onto an adapter error.
fn classify_status(
    status: StatusCode,
    path: &str,
    code: String,
    message: String,
    retry_after: Option<u64>,
) -> AlpacaError {
    match status.as_u16() {
        401 | 403 => AlpacaError::AuthenticationFailed(message),
        400 | 422 => AlpacaError::OrderRejected(message),
        404 => AlpacaError::NotFound(path.to_string()),
        429 => AlpacaError::RateLimited {
            retry_after_secs: retry_after,
        },
        408 | 500..=599 => AlpacaError::Server {
            status: status.as_u16(),
            message,
        },
        _ => AlpacaError::Api { code, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::broker::alpaca::config::AlpacaEnvironment;

    fn classify(status: u16) -> AlpacaError {
        classify_status(
            StatusCode::from_u16(status).unwrap(),
            "/v2/orders",
            status.to_string(),
            "boom".to_string(),
            None,
        )
    }

    #[test]
    fn classifies_auth() {
        assert!(matches!(classify(401), AlpacaError::AuthenticationFailed(_)));
        assert!(matches!(classify(403), AlpacaError::AuthenticationFailed(_)));
    }

    #[test]
    fn classifies_validation() {
        assert!(matches!(classify(400), AlpacaError::OrderRejected(_)));
        assert!(matches!(classify(422), AlpacaError::OrderRejected(_)));
    }

    #[test]
    fn classifies_transient() {
        assert!(matches!(classify(408), AlpacaError::Server { status: 408, .. }));
        assert!(matches!(classify(502), AlpacaError::Server { status: 502, .. }));
        assert!(matches!(classify(429), AlpacaError::RateLimited { .. }));
    }

    #[test]
    fn classifies_not_found() {
        assert_eq!(classify(404), AlpacaError::NotFound("/v2/orders".to_string()));
    }

    #[test]
    fn rejects_empty_credentials() {
        let config = AlpacaConfig::new("", "secret", AlpacaEnvironment::Paper);
        assert!(matches!(
            AlpacaHttpClient::new(&config),
            Err(AlpacaError::AuthenticationFailed(_))
        ));
    }
}
