//! HTTP client factory
//!
//! Outbound transport used by the fallback sources. Every source invocation
//! asks the factory for a fresh client, so handshake cookies never leak
//! between sources or between attempts.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, header};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::ncm_api::CookieJar;

/// Default per-request timeout in seconds
const TIMEOUT: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Options used when creating a client
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    /// Proxy URL (http, https or socks5)
    pub proxy: Option<String>,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// Attach a private cookie jar to the client
    pub cookie_jar: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(TIMEOUT),
            proxy: None,
            insecure: false,
            cookie_jar: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail on non-2xx, otherwise hand back the body
    pub fn into_body(self) -> Result<String> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(anyhow!("Unexpected status {}", self.status))
        }
    }

    /// Value of a cookie set by this response
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("set-cookie"))
            .filter_map(|(_, v)| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| k.trim() == name)
            .map(|(_, v)| v.trim().to_string())
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Creates clients on demand
pub trait HttpClientFactory: Send + Sync {
    fn create(&self, options: &HttpOptions) -> Result<Arc<dyn HttpClient>>;
}

/// reqwest-backed factory
#[derive(Debug, Clone, Default)]
pub struct ReqwestFactory {
    /// Applied to clients whose own options carry no proxy
    proxy: Option<String>,
    insecure: bool,
}

impl ReqwestFactory {
    pub fn new(proxy: Option<String>, insecure: bool) -> Self {
        Self { proxy, insecure }
    }
}

impl HttpClientFactory for ReqwestFactory {
    fn create(&self, options: &HttpOptions) -> Result<Arc<dyn HttpClient>> {
        let mut builder = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.insecure || self.insecure);
        if let Some(proxy) = options.proxy.as_ref().or(self.proxy.as_ref()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        if options.cookie_jar {
            builder = builder.cookie_provider(Arc::new(CookieJar::default()));
        }
        let client = builder
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Arc::new(ReqwestClient { client }))
    }
}

pub struct ReqwestClient {
    client: Client,
}

impl fmt::Debug for ReqwestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestClient")
            .field("client", &"<HttpClient>")
            .finish()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        let has_content_type = request
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            if !has_content_type {
                builder =
                    builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
            }
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| anyhow!("Request failed: {}", e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response: {}", e))?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
