//! Fan-out coordinator
//!
//! Every adapter runs as its own tokio task. The join point waits for all of
//! them; a panicking adapter is reported for its source alone, and tasks
//! still pending at the deadline are aborted and reported as timed out.

use futures_util::future::join_all;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::source::{SourceAdapter, SourceError, SourceName, SourceOutcome, TrackQuery, fetch};
use crate::api::http::HttpClientFactory;

pub struct FanOut {
    sources: Vec<Arc<dyn SourceAdapter>>,
    http: Arc<dyn HttpClientFactory>,
}

impl FanOut {
    pub fn new(sources: Vec<Arc<dyn SourceAdapter>>, http: Arc<dyn HttpClientFactory>) -> Self {
        Self { sources, http }
    }

    pub fn source_names(&self) -> Vec<SourceName> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Wait for every adapter, however long they take
    pub async fn run(&self, query: &TrackQuery) -> HashMap<SourceName, SourceOutcome> {
        self.run_until(query, None).await
    }

    /// Wait for every adapter, giving up on those still pending at `deadline`
    pub async fn run_until(
        &self,
        query: &TrackQuery,
        deadline: Option<Instant>,
    ) -> HashMap<SourceName, SourceOutcome> {
        let tasks = self.sources.iter().map(|adapter| {
            let name = adapter.name();
            let adapter = adapter.clone();
            let http = self.http.clone();
            let query = query.clone();
            let handle =
                tokio::spawn(async move { fetch(adapter.as_ref(), http.as_ref(), &query).await });
            async move { (name, settle(name, handle, deadline).await) }
        });

        let outcomes: HashMap<SourceName, SourceOutcome> = join_all(tasks).await.into_iter().collect();
        debug!(
            "fan-out for track {} settled: {} of {} sources found a url",
            query.track_id,
            outcomes.values().filter(|o| o.playable_url().is_some()).count(),
            outcomes.len()
        );
        outcomes
    }
}

async fn settle(
    name: SourceName,
    mut handle: JoinHandle<SourceOutcome>,
    deadline: Option<Instant>,
) -> SourceOutcome {
    let joined = match deadline {
        Some(at) => match tokio::time::timeout_at(at, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                // A late result must never land anywhere
                handle.abort();
                warn!("{}: still pending at deadline, abandoned", name);
                return SourceOutcome::failed(name, SourceError::TimedOut);
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            error!("{}: adapter panicked: {}", name, message);
            SourceOutcome::failed(name, SourceError::Panicked(message))
        }
        Err(e) => {
            warn!("{}: adapter task ended abnormally: {}", name, e);
            SourceOutcome::failed(name, SourceError::unavailable(e))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
