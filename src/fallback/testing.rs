//! Test doubles for the fallback engine

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::cache::{KeyValueCache, MemoryCache};
use super::source::{Candidate, Resolved, SourceAdapter, SourceError, SourceName, TrackQuery};
use crate::api::http::{HttpClient, HttpClientFactory, HttpOptions, HttpRequest, HttpResponse};
use crate::api::{PlayableStatus, TrackCatalog, TrackMeta};

/// Canned HTTP responses keyed by URL substring; first matching route wins
#[derive(Clone, Default)]
pub struct FakeHttp {
    routes: Arc<Mutex<Vec<(String, HttpResponse)>>>,
    log: Arc<Mutex<Vec<HttpRequest>>>,
    created: Arc<Mutex<Vec<HttpOptions>>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, pattern: &str, status: u16, body: &str) -> Self {
        self.route_with_cookie(pattern, status, body, None)
    }

    pub fn route_with_cookie(
        self,
        pattern: &str,
        status: u16,
        body: &str,
        set_cookie: Option<&str>,
    ) -> Self {
        let headers = set_cookie
            .map(|c| vec![("Set-Cookie".to_string(), c.to_string())])
            .unwrap_or_default();
        self.routes.lock().push((
            pattern.to_string(),
            HttpResponse {
                status,
                headers,
                body: body.to_string(),
            },
        ));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().clone()
    }

    pub fn created(&self) -> Vec<HttpOptions> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.log.lock().push(request.clone());
        self.routes
            .lock()
            .iter()
            .find(|(pattern, _)| request.url.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .ok_or_else(|| anyhow!("connection refused: {}", request.url))
    }
}

impl HttpClientFactory for FakeHttp {
    fn create(&self, options: &HttpOptions) -> Result<Arc<dyn HttpClient>> {
        self.created.lock().push(options.clone());
        Ok(Arc::new(self.clone()))
    }
}

#[derive(Debug, Clone)]
pub enum Behavior {
    Url(String),
    Empty,
    Fail,
    Panic,
    /// Sleep, then answer with the URL
    Slow(Duration, String),
}

/// Adapter with scripted behavior that counts its invocations
pub struct StaticSource {
    name: SourceName,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn new(name: SourceName, behavior: Behavior) -> Self {
        Self {
            name,
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn url(name: SourceName, url: &str) -> Self {
        Self::new(name, Behavior::Url(url.to_string()))
    }

    pub fn empty(name: SourceName) -> Self {
        Self::new(name, Behavior::Empty)
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    fn name(&self) -> SourceName {
        self.name
    }

    async fn search(
        &self,
        _http: &dyn HttpClient,
        query: &TrackQuery,
    ) -> Result<Option<Candidate>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Empty => Ok(None),
            Behavior::Fail => Err(SourceError::Unavailable("scripted failure".into())),
            Behavior::Panic => panic!("{} exploded", self.name),
            Behavior::Slow(delay, _) => {
                tokio::time::sleep(*delay).await;
                Ok(Some(Candidate::new(query.track_id.to_string())))
            }
            Behavior::Url(_) => Ok(Some(Candidate::new(query.track_id.to_string()))),
        }
    }

    async fn resolve(
        &self,
        _http: &dyn HttpClient,
        _candidate: &Candidate,
    ) -> Result<Option<Resolved>, SourceError> {
        match &self.behavior {
            Behavior::Url(url) | Behavior::Slow(_, url) => Ok(Some(Resolved {
                url: url.clone(),
                size_bytes: 1024,
            })),
            _ => Ok(None),
        }
    }
}

/// Six empty sources, with the given ones replaced
pub fn sources_with(overrides: Vec<StaticSource>) -> Vec<Arc<dyn SourceAdapter>> {
    let mut overrides = overrides;
    SourceName::ALL
        .iter()
        .map(|name| {
            let source = match overrides.iter().position(|s| s.name == *name) {
                Some(i) => overrides.remove(i),
                None => StaticSource::empty(*name),
            };
            Arc::new(source) as Arc<dyn SourceAdapter>
        })
        .collect()
}

#[derive(Default)]
pub struct FakeCatalog {
    pub meta: Option<TrackMeta>,
    pub status: Option<PlayableStatus>,
    pub direct_url: Option<String>,
    pub fail: bool,
    /// Held before answering `track_meta`
    pub meta_delay: Option<Duration>,
    pub meta_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn with_meta(name: &str, artist: &str) -> Self {
        Self {
            meta: Some(TrackMeta {
                id: 1,
                name: name.to_string(),
                artist: artist.to_string(),
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TrackCatalog for FakeCatalog {
    async fn track_meta(&self, _track_id: u64) -> Result<Option<TrackMeta>> {
        self.meta_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.meta_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(anyhow!("catalog offline"));
        }
        Ok(self.meta.clone())
    }

    async fn playable(&self, _track_id: u64) -> Result<PlayableStatus> {
        if self.fail {
            return Err(anyhow!("catalog offline"));
        }
        Ok(self.status.unwrap_or(PlayableStatus::Denied))
    }

    async fn song_url(&self, _track_id: u64) -> Result<Option<String>> {
        if self.fail {
            return Err(anyhow!("catalog offline"));
        }
        Ok(self.direct_url.clone())
    }
}

/// In-memory cache that also records every write and its TTL
#[derive(Default)]
pub struct RecordingCache {
    inner: MemoryCache,
    pub writes: Mutex<Vec<(String, Duration)>>,
}

#[async_trait]
impl KeyValueCache for RecordingCache {
    async fn has(&self, key: &str) -> Result<bool> {
        self.inner.has(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.writes.lock().push((key.to_string(), ttl));
        self.inner.set(key, value, ttl).await
    }
}
