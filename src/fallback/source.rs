//! Fallback source contract
//!
//! Each third-party catalog is wrapped in a [`SourceAdapter`] that performs a
//! search step followed by a resolve step. [`fetch`] chains the two and folds
//! every failure into a [`SourceOutcome`], so nothing escapes an adapter as an
//! error.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::api::agent::{choose_china_ip, choose_user_agent};
use crate::api::http::{HttpClient, HttpClientFactory, HttpOptions, HttpRequest};

lazy_static! {
    static ref CALLBACK: Regex = Regex::new(r"(?s)^\s*[\w.$]+\((.*)\)\s*;?\s*$").unwrap();
}

/// Fallback catalogs, declared in priority order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceName {
    Migu,
    Qq,
    Xiami,
    Kuwo,
    Baidu,
    Kugou,
}

impl SourceName {
    pub const ALL: [SourceName; 6] = [
        SourceName::Migu,
        SourceName::Qq,
        SourceName::Xiami,
        SourceName::Kuwo,
        SourceName::Baidu,
        SourceName::Kugou,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::Migu => "migu",
            SourceName::Qq => "qq",
            SourceName::Xiami => "xiami",
            SourceName::Kuwo => "kuwo",
            SourceName::Baidu => "baidu",
            SourceName::Kugou => "kugou",
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fallback attempt's search input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackQuery {
    pub track_id: u64,
    pub title: String,
    pub artist: String,
}

impl TrackQuery {
    /// `"title artist"`, unencoded
    pub fn keyword(&self) -> String {
        format!("{} {}", self.title, self.artist).trim().to_string()
    }

    pub fn encoded_keyword(&self) -> String {
        urlencoding::encode(&self.keyword()).into_owned()
    }
}

/// What a search step hands to the resolve step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    /// Provider's track identifier
    pub id: String,
    /// Secondary file identifier, where the provider has one
    pub file_id: Option<String>,
    pub size_bytes: u64,
    /// Handshake token obtained during search, scoped to this invocation
    pub token: Option<String>,
}

impl Candidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolved {
    pub url: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SourceError {
    /// Network failure, timeout or non-2xx status
    #[error("source unavailable: {0}")]
    Unavailable(String),
    /// Response did not have any expected shape
    #[error("unexpected response: {0}")]
    Parse(String),
    /// Still pending when the attempt's deadline passed
    #[error("timed out")]
    TimedOut,
    #[error("adapter panicked: {0}")]
    Panicked(String),
}

impl SourceError {
    pub fn unavailable(e: impl fmt::Display) -> Self {
        SourceError::Unavailable(e.to_string())
    }

    pub fn parse(e: impl fmt::Display) -> Self {
        SourceError::Parse(e.to_string())
    }
}

/// Terminal state of one adapter in one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source: SourceName,
    pub url: Option<String>,
    pub size_bytes: Option<u64>,
    pub error: Option<SourceError>,
}

impl SourceOutcome {
    pub fn found(source: SourceName, resolved: Resolved) -> Self {
        Self {
            source,
            url: Some(resolved.url),
            size_bytes: Some(resolved.size_bytes),
            error: None,
        }
    }

    /// Searched or resolved cleanly but nothing matched
    pub fn empty(source: SourceName) -> Self {
        Self {
            source,
            url: None,
            size_bytes: None,
            error: None,
        }
    }

    pub fn failed(source: SourceName, error: SourceError) -> Self {
        Self {
            source,
            url: None,
            size_bytes: None,
            error: Some(error),
        }
    }

    /// Non-empty URL, if any
    pub fn playable_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> SourceName;

    /// Options for the client created for each invocation
    fn http_options(&self) -> HttpOptions {
        HttpOptions::default()
    }

    /// Find the first entry whose title contains the query title
    async fn search(
        &self,
        http: &dyn HttpClient,
        query: &TrackQuery,
    ) -> Result<Option<Candidate>, SourceError>;

    /// Turn a candidate into a playable URL
    async fn resolve(
        &self,
        http: &dyn HttpClient,
        candidate: &Candidate,
    ) -> Result<Option<Resolved>, SourceError>;
}

/// Run one adapter's search → resolve chain against a fresh client
pub async fn fetch(
    adapter: &dyn SourceAdapter,
    factory: &dyn HttpClientFactory,
    query: &TrackQuery,
) -> SourceOutcome {
    let source = adapter.name();
    let http = match factory.create(&adapter.http_options()) {
        Ok(http) => http,
        Err(e) => return SourceOutcome::failed(source, SourceError::unavailable(e)),
    };

    let candidate = match adapter.search(http.as_ref(), query).await {
        Ok(Some(candidate)) => candidate,
        Ok(None) => {
            debug!("{}: no match for '{}'", source, query.keyword());
            return SourceOutcome::empty(source);
        }
        Err(e) => {
            debug!("{}: search failed: {}", source, e);
            return SourceOutcome::failed(source, e);
        }
    };

    match adapter.resolve(http.as_ref(), &candidate).await {
        Ok(Some(resolved)) if !resolved.url.is_empty() => {
            debug!("{}: resolved {} -> {}", source, candidate.id, resolved.url);
            SourceOutcome::found(source, resolved)
        }
        Ok(_) => {
            debug!("{}: candidate {} has no playable url", source, candidate.id);
            SourceOutcome::empty(source)
        }
        Err(e) => {
            debug!("{}: resolve failed: {}", source, e);
            SourceOutcome::failed(source, e)
        }
    }
}

/// Case-sensitive containment of the query title in a displayed title
pub fn title_matches(displayed: &str, title: &str) -> bool {
    displayed.contains(title)
}

/// First item whose displayed title contains `title`
pub fn first_match<'a, F>(items: &'a [Value], title: &str, display: F) -> Option<&'a Value>
where
    F: Fn(&Value) -> Option<String>,
{
    items
        .iter()
        .find(|item| display(item).is_some_and(|shown| title_matches(&shown, title)))
}

/// Strip a `name(...)` callback wrapper and decode the payload
///
/// A body without the wrapper decodes to an empty object.
pub fn unwrap_callback(body: &str) -> Result<Value, SourceError> {
    match CALLBACK.captures(body).and_then(|caps| caps.get(1)) {
        Some(inner) => serde_json::from_str(inner.as_str()).map_err(SourceError::parse),
        None => Ok(Value::Object(Default::default())),
    }
}

pub fn parse_json(body: &str) -> Result<Value, SourceError> {
    serde_json::from_str(body).map_err(SourceError::parse)
}

/// Identifiers arrive as either strings or numbers
pub fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Sizes arrive as either numbers or numeric strings
pub fn size_of(v: Option<&Value>) -> u64 {
    match v {
        Some(Value::Number(n)) => n.as_u64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

/// Dress a request like desktop traffic from the mainland
pub fn disguise(request: HttpRequest) -> HttpRequest {
    request
        .header("User-Agent", choose_user_agent("pc"))
        .header("X-Forwarded-For", choose_china_ip())
}

/// Send and return the body of a 2xx response
pub async fn get_body(http: &dyn HttpClient, request: HttpRequest) -> Result<String, SourceError> {
    http.request(request)
        .await
        .map_err(SourceError::unavailable)?
        .into_body()
        .map_err(SourceError::unavailable)
}
