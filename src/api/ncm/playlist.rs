//! Playlist detail, categories and edits

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use tracing::info;

use super::NcmCatalog;
use crate::api::ncm_api::{
    CryptoApi, PlayListCategory, PlayListDetail, PlayListTag, to_batch_result, to_hot_tags,
    to_msg, to_playlist_categories, to_playlist_detail,
};

const DETAIL_URL: &str = "https://music.163.com/weapi/v3/playlist/detail";
const CATALOGUE_URL: &str = "https://music.163.com/weapi/playlist/catalogue";
const HOT_TAGS_URL: &str = "https://music.163.com/weapi/playlist/hottags";
const BATCH_URL: &str = "https://music.163.com/weapi/batch";
const EAPI_BASE: &str = "http://interface3.music.163.com/eapi";

/// Collaborators returned per playlist detail request
pub const DETAIL_SUBSCRIBERS: u32 = 8;

/// One editable playlist field and the API path that changes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayListField {
    Desc,
    Name,
    Tags,
}

impl PlayListField {
    fn key(&self) -> &'static str {
        match self {
            Self::Desc => "desc",
            Self::Name => "name",
            Self::Tags => "tags",
        }
    }

    /// Logical path, also the key inside a batch request
    fn api_path(&self) -> &'static str {
        match self {
            Self::Desc => "/api/playlist/desc/update",
            Self::Name => "/api/playlist/update/name",
            Self::Tags => "/api/playlist/tags/update",
        }
    }

    fn eapi_url(&self) -> String {
        format!("{}{}", EAPI_BASE, self.api_path().trim_start_matches("/api"))
    }
}

impl NcmCatalog {
    fn detail_request(id: u64, subscribers: u32) -> HashMap<&'static str, String> {
        let mut params = HashMap::new();
        params.insert("id", id.to_string());
        params.insert("n", "100000".to_string());
        params.insert("s", subscribers.to_string());
        params
    }

    fn batch_update_request(
        id: u64,
        name: &str,
        desc: &str,
        tags: &str,
    ) -> HashMap<&'static str, String> {
        let mut params = HashMap::new();
        for (field, value) in [
            (PlayListField::Desc, desc),
            (PlayListField::Tags, tags),
            (PlayListField::Name, name),
        ] {
            params.insert(
                field.api_path(),
                serde_json::json!({ "id": id, field.key(): value }).to_string(),
            );
        }
        params
    }

    /// Playlist header and its tracks, over the linux forwarder
    pub async fn playlist_detail(&self, id: u64, subscribers: u32) -> Result<PlayListDetail> {
        let body = self
            .post(
                DETAIL_URL,
                Self::detail_request(id, subscribers),
                &self.profile(CryptoApi::LinuxApi),
            )
            .await?;
        to_playlist_detail(body)
    }

    pub async fn playlist_categories(&self) -> Result<Vec<PlayListCategory>> {
        let body = self
            .post(CATALOGUE_URL, HashMap::new(), &self.profile(CryptoApi::Weapi))
            .await?;
        to_playlist_categories(body)
    }

    pub async fn hot_playlist_tags(&self) -> Result<Vec<PlayListTag>> {
        let body = self
            .post(HOT_TAGS_URL, HashMap::new(), &self.profile(CryptoApi::Weapi))
            .await?;
        to_hot_tags(body)
    }

    /// Rewrite name, description and tags in one batch call
    pub async fn update_playlist(&self, id: u64, name: &str, desc: &str, tags: &str) -> Result<()> {
        if name.is_empty() {
            return Err(anyhow!("playlist name is required"));
        }
        let mut profile = self.profile(CryptoApi::Weapi);
        profile.cookies.retain(|(k, _)| k != "os");
        let profile = profile.cookie("os", "pc");
        let body = self
            .post(
                BATCH_URL,
                Self::batch_update_request(id, name, desc, tags),
                &profile,
            )
            .await?;
        to_batch_result(
            body,
            &[
                PlayListField::Desc.api_path(),
                PlayListField::Tags.api_path(),
                PlayListField::Name.api_path(),
            ],
        )?;
        info!("Playlist {} updated", id);
        Ok(())
    }

    /// Change a single field over eapi
    pub async fn update_playlist_field(
        &self,
        id: u64,
        field: PlayListField,
        value: &str,
    ) -> Result<()> {
        if value.is_empty() {
            return Err(anyhow!("playlist {} is required", field.key()));
        }
        let mut params = HashMap::new();
        params.insert("id", id.to_string());
        params.insert(field.key(), value.to_string());
        let mut profile = self.profile(CryptoApi::Eapi);
        profile.eapi_url = Some(field.api_path().to_string());
        let body = self.post(&field.eapi_url(), params, &profile).await?;
        to_msg(body)?;
        info!("Playlist {} {} updated", id, field.key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DEFAULT_BITRATE, MusicApi};
    use serde_json::Value;

    #[test]
    fn test_field_paths() {
        assert_eq!(
            PlayListField::Name.eapi_url(),
            "http://interface3.music.163.com/eapi/playlist/update/name"
        );
        assert_eq!(
            PlayListField::Desc.eapi_url(),
            "http://interface3.music.163.com/eapi/playlist/desc/update"
        );
        assert_eq!(PlayListField::Tags.api_path(), "/api/playlist/tags/update");
    }

    #[test]
    fn test_detail_request() {
        let params = NcmCatalog::detail_request(24381616, DETAIL_SUBSCRIBERS);
        assert_eq!(params["id"], "24381616");
        assert_eq!(params["n"], "100000");
        assert_eq!(params["s"], "8");
    }

    #[test]
    fn test_batch_request_carries_every_field() {
        let params = NcmCatalog::batch_update_request(7, "新名字", "", "华语;流行");
        assert_eq!(params.len(), 3);
        let name: Value = serde_json::from_str(&params["/api/playlist/update/name"]).unwrap();
        assert_eq!(name["id"], 7);
        assert_eq!(name["name"], "新名字");
        let desc: Value = serde_json::from_str(&params["/api/playlist/desc/update"]).unwrap();
        assert_eq!(desc["desc"], "");
        let tags: Value = serde_json::from_str(&params["/api/playlist/tags/update"]).unwrap();
        assert_eq!(tags["tags"], "华语;流行");
    }

    #[tokio::test]
    async fn test_required_values_rejected_before_sending() {
        let catalog = NcmCatalog::new(MusicApi::new(None, false).unwrap(), DEFAULT_BITRATE);
        assert!(catalog.update_playlist(7, "", "d", "t").await.is_err());
        assert!(
            catalog
                .update_playlist_field(7, PlayListField::Tags, "")
                .await
                .is_err()
        );
    }
}
