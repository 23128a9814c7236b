//! Fallback source adapters
//!
//! One module per third-party catalog. `xiami` and `kuwo` need a priming
//! request for a session token before they will answer a search; the rest
//! take a keyed search directly.

mod baidu;
mod kugou;
mod kuwo;
mod migu;
mod qq;
mod xiami;

use std::sync::Arc;

pub use baidu::Baidu;
pub use kugou::Kugou;
pub use kuwo::Kuwo;
pub use migu::Migu;
pub use qq::Qq;
pub use xiami::Xiami;

use super::source::{SourceAdapter, SourceName};

pub fn source_for(name: SourceName) -> Arc<dyn SourceAdapter> {
    match name {
        SourceName::Migu => Arc::new(Migu),
        SourceName::Qq => Arc::new(Qq),
        SourceName::Xiami => Arc::new(Xiami),
        SourceName::Kuwo => Arc::new(Kuwo),
        SourceName::Baidu => Arc::new(Baidu),
        SourceName::Kugou => Arc::new(Kugou),
    }
}

/// Adapters for the given sources, duplicates dropped
pub fn sources(names: &[SourceName]) -> Vec<Arc<dyn SourceAdapter>> {
    let mut seen = Vec::new();
    names
        .iter()
        .filter(|name| {
            if seen.contains(*name) {
                false
            } else {
                seen.push(**name);
                true
            }
        })
        .map(|name| source_for(*name))
        .collect()
}

pub fn default_sources() -> Vec<Arc<dyn SourceAdapter>> {
    sources(&SourceName::ALL)
}
