use crate::error::AdapterError;
use reqwest::{header::HeaderMap, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone, Debug)]
pub enum AuthStrategy {
    Bearer { token: String },
    Header { name: String, value: String },
    None,
}

/// Thin reqwest wrapper shared by all adapters: base URL handling,
/// default headers, auth, and uniform error mapping.
#[derive(Clone)]
pub struct HttpProviderClient {
    http: Client,
    base_url: String,
    default_headers: HeaderMap,
}

impl HttpProviderClient {
    pub fn new(
        timeout: Duration,
        base_url: Option<String>,
        default_base: &str,
        headers: &HashMap<String, String>,
        auth: AuthStrategy,
    ) -> Result<Self, AdapterError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Config {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        let mut default_headers = HeaderMap::new();

        match auth {
            AuthStrategy::Bearer { token } => {
                let value = format!("Bearer {token}")
                    .parse()
                    .map_err(|_| AdapterError::Config {
                        message: "credential is not a valid header value".to_string(),
                    })?;
                default_headers.insert("Authorization", value);
            }
            AuthStrategy::Header { name, value } => {
                let name = name
                    .parse::<reqwest::header::HeaderName>()
                    .map_err(|_| AdapterError::Config {
                        message: format!("invalid auth header name: {name}"),
                    })?;
                let value = value.parse().map_err(|_| AdapterError::Config {
                    message: "credential is not a valid header value".to_string(),
                })?;
                default_headers.insert(name, value);
            }
            AuthStrategy::None => {}
        }

        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (k.parse::<reqwest::header::HeaderName>(), v.parse()) {
                default_headers.insert(name, value);
            }
        }

        let base_url = base_url.unwrap_or_else(|| default_base.to_string());

        Ok(Self {
            http,
            base_url,
            default_headers,
        })
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url.trim_end_matches('/'), path)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }
    }

    pub async fn post_json<TReq: Serialize, TResp: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TResp, AdapterError> {
        let resp = self
            .http
            .request(Method::POST, self.build_url(path))
            .headers(self.default_headers.clone())
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(resp.json::<TResp>().await?)
    }

    pub async fn post_form<TResp: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<TResp, AdapterError> {
        let resp = self
            .http
            .request(Method::POST, self.build_url(path))
            .headers(self.default_headers.clone())
            .form(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(resp.json::<TResp>().await?)
    }

    pub async fn get_json<TResp: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<TResp, AdapterError> {
        let resp = self
            .http
            .request(Method::GET, self.build_url(path))
            .headers(self.default_headers.clone())
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(resp.json::<TResp>().await?)
    }
}

/// Map a non-success upstream response into the adapter taxonomy.
pub async fn map_error_response(resp: Response) -> AdapterError {
    let status = resp.status();
    let message = match resp.text().await {
        Ok(body) => serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message").or(Some(e)))
                    .or_else(|| v.get("message"))
                    .cloned()
            })
            .and_then(|m| m.as_str().map(|s| s.to_string()))
            .unwrap_or(body),
        Err(_) => "failed to read error response".to_string(),
    };

    match status.as_u16() {
        400 => AdapterError::InvalidRequest { message },
        401 | 403 => AdapterError::Config {
            message: format!("credential rejected: {message}"),
        },
        408 => AdapterError::Timeout,
        // 456 is DeepL's quota-exhausted status.
        429 | 456 => AdapterError::QuotaExceeded,
        code if code >= 500 => AdapterError::UpstreamUnavailable { message },
        code => AdapterError::Api { code, message },
    }
}
