//! Fallback orchestrator
//!
//! [`Unblocker`] ties the primary catalog to the fallback engine: cached
//! verdicts short-circuit everything, otherwise the track's metadata drives
//! one fan-out whose merged result is cached and returned.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cache::{MemoryCache, ResolutionCache};
use super::fanout::FanOut;
use super::resolver::merge;
use super::source::{SourceName, TrackQuery};
use super::sources::sources;
use crate::api::{NcmCatalog, PlayableStatus, ReqwestFactory, TrackCatalog, TrackMeta};
use crate::config::Settings;

pub const PLAYABLE_MESSAGE: &str = "ok";
pub const NOT_PLAYABLE_MESSAGE: &str = "亲爱的,暂无版权";

/// Answer to "can this track be played"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playability {
    pub playable: bool,
    pub message: String,
}

impl Playability {
    fn new(playable: bool) -> Self {
        let message = if playable {
            PLAYABLE_MESSAGE
        } else {
            NOT_PLAYABLE_MESSAGE
        };
        Self {
            playable,
            message: message.to_string(),
        }
    }
}

pub struct Unblocker {
    catalog: Arc<dyn TrackCatalog>,
    fanout: FanOut,
    cache: ResolutionCache,
    /// Bound on one `resolve` call; `None` waits for every source
    deadline: Option<Duration>,
}

impl Unblocker {
    pub fn new(catalog: Arc<dyn TrackCatalog>, fanout: FanOut, cache: ResolutionCache) -> Self {
        Self {
            catalog,
            fanout,
            cache,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Production wiring: NetEase catalog, reqwest clients, in-memory cache
    pub fn from_settings(settings: &Settings, cookie: Option<&str>) -> Result<Self> {
        let network = &settings.network;
        let catalog = NcmCatalog::from_settings(settings, cookie)?;
        let fanout = FanOut::new(
            sources(&settings.fallback.enabled_sources()),
            Arc::new(ReqwestFactory::new(network.proxy(), network.insecure_tls)),
        );
        info!("fallback sources enabled: {:?}", fanout.source_names());

        Ok(Self::new(
            Arc::new(catalog),
            fanout,
            ResolutionCache::new(Arc::new(MemoryCache::new())),
        )
        .with_deadline(settings.fallback.deadline()))
    }

    pub fn sources(&self) -> Vec<SourceName> {
        self.fanout.source_names()
    }

    /// Playable URL from the fallback sources; empty when none has one
    pub async fn resolve(&self, track_id: u64) -> String {
        // a deadline too far out to represent is no deadline
        let deadline = self.deadline.and_then(|d| Instant::now().checked_add(d));

        if let Some(cached) = self.cache.lookup(track_id).await {
            return cached.chosen_url;
        }

        let lookup = self.catalog.track_meta(track_id);
        let meta = match deadline {
            Some(at) => match tokio::time::timeout_at(at, lookup).await {
                Ok(meta) => meta,
                Err(_) => {
                    warn!("Deadline passed fetching metadata for track {}", track_id);
                    return String::new();
                }
            },
            None => lookup.await,
        };
        let Some(meta) = Self::usable_meta(track_id, meta) else {
            return String::new();
        };
        if deadline.is_some_and(|at| Instant::now() >= at) {
            warn!("Deadline passed before fallback search for track {}", track_id);
            return String::new();
        }

        let query = TrackQuery {
            track_id,
            title: meta.name,
            artist: meta.artist,
        };
        debug!("Fallback search for {}: '{}'", track_id, query.keyword());
        let result = merge(self.fanout.run_until(&query, deadline).await);
        self.cache.store(track_id, &result).await;
        result.chosen_url
    }

    fn usable_meta(track_id: u64, meta: Result<Option<TrackMeta>>) -> Option<TrackMeta> {
        match meta {
            Ok(Some(meta)) if !meta.name.is_empty() => Some(meta),
            Ok(_) => {
                info!("No metadata for track {}, skipping fallback", track_id);
                None
            }
            Err(e) => {
                warn!("Failed to get metadata for track {}: {}", track_id, e);
                None
            }
        }
    }

    /// Ask the catalog first; fall back only for denied or trial-only tracks
    pub async fn check_playable(&self, track_id: u64) -> Result<Playability> {
        let status = self.catalog.playable(track_id).await?;
        if status.playable() {
            return Ok(Playability::new(true));
        }
        if status == PlayableStatus::TrialOnly {
            debug!("Track {} is trial-only on the primary catalog", track_id);
        }
        let url = self.resolve(track_id).await;
        Ok(Playability::new(!url.is_empty()))
    }

    /// Direct catalog URL, or the fallback when the catalog has none
    pub async fn play_url(&self, track_id: u64) -> String {
        match self.catalog.song_url(track_id).await {
            Ok(Some(url)) if !url.is_empty() => return url,
            Ok(_) => debug!("No direct url for track {}", track_id),
            Err(e) => warn!("Failed to get song url for {}: {}", track_id, e),
        }
        self.resolve(track_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::cache::{HIT_TTL, MISS_TTL};
    use crate::fallback::testing::{
        Behavior, FakeCatalog, FakeHttp, RecordingCache, StaticSource, sources_with,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        unblocker: Unblocker,
        store: Arc<RecordingCache>,
        catalog: Arc<FakeCatalog>,
    }

    fn harness(catalog: FakeCatalog, overrides: Vec<StaticSource>) -> Harness {
        let store = Arc::new(RecordingCache::default());
        let catalog = Arc::new(catalog);
        let unblocker = Unblocker::new(
            catalog.clone(),
            FanOut::new(sources_with(overrides), Arc::new(FakeHttp::new())),
            ResolutionCache::new(store.clone()),
        );
        Harness {
            unblocker,
            store,
            catalog,
        }
    }

    fn counted(source: StaticSource) -> (StaticSource, Arc<AtomicUsize>) {
        let calls = source.counter();
        (source, calls)
    }

    #[tokio::test]
    async fn test_highest_priority_url_is_returned_and_cached() {
        let h = harness(
            FakeCatalog::with_meta("晴天", "周杰伦"),
            vec![
                StaticSource::url(SourceName::Qq, "http://q.example/a.mp3"),
                StaticSource::url(SourceName::Xiami, "http://x.example/b.mp3"),
            ],
        );
        assert_eq!(h.unblocker.resolve(1).await, "http://q.example/a.mp3");
        assert_eq!(
            h.store.writes.lock().clone(),
            vec![("1_unblock_url".to_string(), HIT_TTL)]
        );
    }

    #[tokio::test]
    async fn test_all_empty_caches_short_miss() {
        let h = harness(FakeCatalog::with_meta("晴天", "周杰伦"), Vec::new());
        assert_eq!(h.unblocker.resolve(1).await, "");
        assert_eq!(
            h.store.writes.lock().clone(),
            vec![("1_unblock_url".to_string(), MISS_TTL)]
        );
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fan_out() {
        let (qq, calls) = counted(StaticSource::url(SourceName::Qq, "http://q.example/a.mp3"));
        let h = harness(FakeCatalog::with_meta("晴天", "周杰伦"), vec![qq]);

        let first = h.unblocker.resolve(1).await;
        let second = h.unblocker.resolve(1).await;
        assert_eq!(first, "http://q.example/a.mp3");
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.catalog.meta_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.writes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cached_miss_is_not_retried() {
        let (kugou, calls) = counted(StaticSource::empty(SourceName::Kugou));
        let h = harness(FakeCatalog::with_meta("晴天", "周杰伦"), vec![kugou]);

        assert_eq!(h.unblocker.resolve(1).await, "");
        assert_eq!(h.unblocker.resolve(1).await, "");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_not_cached() {
        let (migu, calls) = counted(StaticSource::url(SourceName::Migu, "http://m.example/a.mp3"));
        let h = harness(FakeCatalog::default(), vec![migu]);

        assert_eq!(h.unblocker.resolve(1).await, "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!h.unblocker.cache.contains(1).await);
        assert!(h.store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_failure_is_not_cached() {
        let h = harness(
            FakeCatalog {
                fail: true,
                ..Default::default()
            },
            Vec::new(),
        );
        assert_eq!(h.unblocker.resolve(1).await, "");
        assert!(h.store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_source_does_not_spoil_the_merge() {
        let h = harness(
            FakeCatalog::with_meta("晴天", "周杰伦"),
            vec![
                StaticSource::new(SourceName::Migu, Behavior::Panic),
                StaticSource::url(SourceName::Kuwo, "http://k.example/a.mp3"),
            ],
        );
        assert_eq!(h.unblocker.resolve(1).await, "http://k.example/a.mp3");

        let cached = h.unblocker.cache.lookup(1).await.unwrap();
        assert_eq!(cached.per_source.len(), 6);
        assert_eq!(cached.chosen_source, Some(SourceName::Kuwo));
    }

    #[tokio::test]
    async fn test_deadline_drops_late_sources() {
        let store = Arc::new(RecordingCache::default());
        let unblocker = Unblocker::new(
            Arc::new(FakeCatalog::with_meta("晴天", "周杰伦")),
            FanOut::new(
                sources_with(vec![
                    StaticSource::new(
                        SourceName::Migu,
                        Behavior::Slow(Duration::from_secs(30), "http://m.example/late.mp3".into()),
                    ),
                    StaticSource::url(SourceName::Baidu, "http://b.example/a.mp3"),
                ]),
                Arc::new(FakeHttp::new()),
            ),
            ResolutionCache::new(store.clone()),
        )
        .with_deadline(Some(Duration::from_millis(100)));

        assert_eq!(unblocker.resolve(1).await, "http://b.example/a.mp3");
    }

    #[tokio::test]
    async fn test_deadline_covers_metadata_lookup() {
        let (qq, calls) = counted(StaticSource::url(SourceName::Qq, "http://q.example/a.mp3"));
        let mut h = harness(
            FakeCatalog {
                meta_delay: Some(Duration::from_millis(300)),
                ..FakeCatalog::with_meta("晴天", "周杰伦")
            },
            vec![qq],
        );
        h.unblocker.deadline = Some(Duration::from_millis(100));

        let started = Instant::now();
        assert_eq!(h.unblocker.resolve(1).await, "");
        assert!(started.elapsed() < Duration::from_millis(280));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(h.store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unrepresentable_deadline_means_none() {
        let mut h = harness(
            FakeCatalog::with_meta("晴天", "周杰伦"),
            vec![StaticSource::url(SourceName::Kuwo, "http://k.example/a.mp3")],
        );
        h.unblocker.deadline = Some(Duration::from_secs(u64::MAX));
        assert_eq!(h.unblocker.resolve(1).await, "http://k.example/a.mp3");
    }

    #[tokio::test]
    async fn test_check_playable_on_catalog() {
        let (qq, calls) = counted(StaticSource::url(SourceName::Qq, "http://q.example/a.mp3"));
        let h = harness(
            FakeCatalog {
                status: Some(PlayableStatus::Playable),
                ..FakeCatalog::with_meta("晴天", "周杰伦")
            },
            vec![qq],
        );
        let answer = h.unblocker.check_playable(1).await.unwrap();
        assert_eq!(answer, Playability::new(true));
        assert_eq!(answer.message, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_check_playable_falls_back() {
        let h = harness(
            FakeCatalog {
                status: Some(PlayableStatus::TrialOnly),
                ..FakeCatalog::with_meta("晴天", "周杰伦")
            },
            vec![StaticSource::url(SourceName::Qq, "http://q.example/a.mp3")],
        );
        assert!(h.unblocker.check_playable(1).await.unwrap().playable);
    }

    #[tokio::test]
    async fn test_check_playable_denied_everywhere() {
        let h = harness(FakeCatalog::with_meta("晴天", "周杰伦"), Vec::new());
        let answer = h.unblocker.check_playable(1).await.unwrap();
        assert!(!answer.playable);
        assert_eq!(answer.message, NOT_PLAYABLE_MESSAGE);
    }

    #[tokio::test]
    async fn test_check_playable_surfaces_catalog_faults() {
        let h = harness(
            FakeCatalog {
                fail: true,
                ..Default::default()
            },
            Vec::new(),
        );
        assert!(h.unblocker.check_playable(1).await.is_err());
    }

    #[tokio::test]
    async fn test_play_url_prefers_catalog() {
        let (qq, calls) = counted(StaticSource::url(SourceName::Qq, "http://q.example/a.mp3"));
        let h = harness(
            FakeCatalog {
                direct_url: Some("http://m10.music.126.net/a.mp3".into()),
                ..FakeCatalog::with_meta("晴天", "周杰伦")
            },
            vec![qq],
        );
        assert_eq!(h.unblocker.play_url(1).await, "http://m10.music.126.net/a.mp3");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_play_url_falls_back() {
        let h = harness(
            FakeCatalog::with_meta("晴天", "周杰伦"),
            vec![StaticSource::url(SourceName::Xiami, "http://x.example/b.mp3")],
        );
        assert_eq!(h.unblocker.play_url(1).await, "http://x.example/b.mp3");
    }

    #[test]
    fn test_from_settings_honours_source_selection() {
        let mut settings = Settings::default();
        settings.fallback.sources = vec![SourceName::Kugou, SourceName::Migu];
        let unblocker = Unblocker::from_settings(&settings, Some("MUSIC_U=abc")).unwrap();
        assert_eq!(unblocker.sources(), vec![SourceName::Kugou, SourceName::Migu]);
        assert_eq!(unblocker.deadline, Some(Duration::from_secs(15)));
    }
}
