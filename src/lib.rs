//! ncm-unblock
//!
//! Finds playable stream URLs for NetEase Cloud Music tracks the catalog
//! itself will not serve, by searching other catalogs for the same song.

pub mod api;
pub mod config;
pub mod fallback;
