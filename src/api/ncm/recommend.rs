//! Daily recommendations; both calls need a logged-in cookie

use anyhow::Result;
use std::collections::HashMap;
use tracing::warn;

use super::NcmCatalog;
use crate::api::ncm_api::{CryptoApi, SongList, TrackMeta, to_recommend_resource, to_recommend_songs};

const RESOURCE_URL: &str = "https://music.163.com/weapi/v1/discovery/recommend/resource";
const SONGS_URL: &str = "https://music.163.com/weapi/v1/discovery/recommend/songs";

impl NcmCatalog {
    fn logged_in(&self) -> bool {
        self.cookies.iter().any(|(k, _)| k == "MUSIC_U")
    }

    /// Daily recommended playlists
    pub async fn recommend_resource(&self) -> Result<Vec<SongList>> {
        if !self.logged_in() {
            warn!("Requesting recommendations without a MUSIC_U cookie");
        }
        let body = self
            .post(RESOURCE_URL, HashMap::new(), &self.profile(CryptoApi::Weapi))
            .await?;
        to_recommend_resource(body)
    }

    /// Daily recommended songs
    pub async fn recommend_songs(&self) -> Result<Vec<TrackMeta>> {
        if !self.logged_in() {
            warn!("Requesting recommendations without a MUSIC_U cookie");
        }
        let mut params = HashMap::new();
        params.insert("total", "true".to_string());
        let body = self
            .post(SONGS_URL, params, &self.profile(CryptoApi::Weapi))
            .await?;
        to_recommend_songs(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DEFAULT_BITRATE, MusicApi};

    #[test]
    fn test_logged_in() {
        let catalog = NcmCatalog::new(MusicApi::new(None, false).unwrap(), DEFAULT_BITRATE);
        assert!(!catalog.logged_in());
        assert!(catalog.with_cookie_header("MUSIC_U=abc; os=pc").logged_in());
    }
}
