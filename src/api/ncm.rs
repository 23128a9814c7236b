//! NCM catalog
//!
//! The primary catalog as seen by the fallback engine: track metadata,
//! licensing checks and direct stream URLs, all over signed requests. The
//! playlist and recommendation calls live in the child modules.

mod playlist;
mod recommend;

pub use playlist::{DETAIL_SUBSCRIBERS, PlayListField};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::ncm_api::{
    CryptoApi, Method, MusicApi, PlayableStatus, RequestProfile, TrackMeta, to_playable_status,
    to_song_url, to_track_meta,
};
use crate::config::Settings;

/// Lossless; what the catalog is asked for unless configured otherwise
pub const DEFAULT_BITRATE: u32 = 999000;

const SONG_URL_API: &str = "https://music.163.com/api/song/enhance/player/url";
const SONG_URL_WEAPI: &str = "https://music.163.com/weapi/song/enhance/player/url";
const SONG_DETAIL_WEAPI: &str = "https://music.163.com/weapi/v3/song/detail";

/// What the fallback engine needs from the primary catalog
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// Name and primary artist; `None` when the catalog has nothing usable
    async fn track_meta(&self, track_id: u64) -> Result<Option<TrackMeta>>;

    async fn playable(&self, track_id: u64) -> Result<PlayableStatus>;

    /// Direct stream URL served by the catalog itself
    async fn song_url(&self, track_id: u64) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct NcmCatalog {
    api: MusicApi,
    /// Caller's login cookies, forwarded on every request
    cookies: Vec<(String, String)>,
    bitrate: u32,
}

impl NcmCatalog {
    pub fn new(api: MusicApi, bitrate: u32) -> Self {
        Self {
            api,
            cookies: Vec::new(),
            bitrate,
        }
    }

    /// Catalog wired from the network settings, proxy included
    pub fn from_settings(settings: &Settings, cookie: Option<&str>) -> Result<Self> {
        let network = &settings.network;
        let mut api = MusicApi::new(Some(network.timeout()), network.insecure_tls)?;
        if let Some(proxy) = network.proxy() {
            api.set_proxy(&proxy, Some(network.timeout()), network.insecure_tls)?;
        }
        let catalog = Self::new(api, settings.fallback.bitrate);
        Ok(match cookie {
            Some(cookie) => catalog.with_cookie_header(cookie),
            None => catalog,
        })
    }

    /// Forward a browser-style cookie header (`MUSIC_U=...; __csrf=...`)
    pub fn with_cookie_header(mut self, header: &str) -> Self {
        self.api.set_csrf_from_cookies(header);
        self.cookies = header
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        self
    }

    fn profile(&self, crypto: CryptoApi) -> RequestProfile {
        RequestProfile::new(crypto).cookies(&self.cookies)
    }

    /// POST and hand back the body of a 200 answer
    async fn post(
        &self,
        url: &str,
        params: HashMap<&str, String>,
        profile: &RequestProfile,
    ) -> Result<String> {
        let (status, body) = self.api.send(Method::Post, url, params, profile).await?;
        if status != 200 {
            return Err(anyhow!("{} returned status {}", url, status));
        }
        Ok(body)
    }

    fn detail_params(track_id: u64) -> HashMap<&'static str, String> {
        let mut params = HashMap::new();
        params.insert("c", serde_json::json!([{ "id": track_id }]).to_string());
        params.insert("ids", format!("[{}]", track_id));
        params
    }

    fn url_params(&self, track_id: u64) -> HashMap<&'static str, String> {
        let mut params = HashMap::new();
        params.insert("ids", format!("[{}]", track_id));
        params.insert("br", self.bitrate.to_string());
        params
    }

    /// Anonymous callers get a throwaway device id, as the web client does
    fn song_url_profile(&self) -> RequestProfile {
        let mut profile = self.profile(CryptoApi::LinuxApi);
        if !profile.has_cookie("MUSIC_U") {
            let mut nuid = [0u8; 16];
            rand::fill(&mut nuid[..]);
            profile = profile.cookie("_ntes_nuid", hex::encode(nuid));
        }
        if !profile.has_cookie("os") {
            profile = profile.cookie("os", "pc");
        }
        profile
    }
}

#[async_trait]
impl TrackCatalog for NcmCatalog {
    async fn track_meta(&self, track_id: u64) -> Result<Option<TrackMeta>> {
        let profile = self.profile(CryptoApi::Weapi);
        let (status, body) = self
            .api
            .send(Method::Post, SONG_DETAIL_WEAPI, Self::detail_params(track_id), &profile)
            .await?;
        if status != 200 {
            warn!("Song detail for {} returned status {}", track_id, status);
            return Ok(None);
        }
        to_track_meta(body)
    }

    async fn playable(&self, track_id: u64) -> Result<PlayableStatus> {
        let profile = self.profile(CryptoApi::Weapi);
        let (status, body) = self
            .api
            .send(Method::Post, SONG_URL_WEAPI, self.url_params(track_id), &profile)
            .await?;
        let playable = to_playable_status(status, &body)?;
        debug!("Song {} playability: {:?}", track_id, playable);
        Ok(playable)
    }

    async fn song_url(&self, track_id: u64) -> Result<Option<String>> {
        let (status, body) = self
            .api
            .send(
                Method::Post,
                SONG_URL_API,
                self.url_params(track_id),
                &self.song_url_profile(),
            )
            .await?;
        if status != 200 {
            warn!("Song url for {} returned status {}", track_id, status);
            return Ok(None);
        }
        Ok(to_song_url(body)?.into_iter().next().map(|s| s.url))
    }
}
