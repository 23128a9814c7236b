//! Priority merge of per-source outcomes

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use super::source::{SourceName, SourceOutcome};

/// Highest first. Nothing but this order breaks ties between found URLs.
pub const PRIORITY: [SourceName; 6] = SourceName::ALL;

/// One fallback attempt's verdict, plus every source's outcome for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Empty when no source produced a URL
    pub chosen_url: String,
    pub chosen_source: Option<SourceName>,
    pub per_source: BTreeMap<SourceName, SourceOutcome>,
}

impl AggregationResult {
    pub fn is_hit(&self) -> bool {
        !self.chosen_url.is_empty()
    }
}

pub fn merge(per_source: HashMap<SourceName, SourceOutcome>) -> AggregationResult {
    let chosen = PRIORITY.iter().find_map(|name| {
        per_source
            .get(name)
            .and_then(|outcome| outcome.playable_url())
            .map(|url| (*name, url.to_string()))
    });

    for outcome in per_source.values() {
        if let Some(e) = &outcome.error {
            debug!("{}: {}", outcome.source, e);
        }
    }

    let per_source: BTreeMap<_, _> = per_source.into_iter().collect();
    match chosen {
        Some((source, url)) => {
            info!("fallback chose {} ({})", source, url);
            AggregationResult {
                chosen_url: url,
                chosen_source: Some(source),
                per_source,
            }
        }
        None => {
            info!("fallback exhausted all {} sources", per_source.len());
            AggregationResult {
                per_source,
                ..Default::default()
            }
        }
    }
}
