//! Xiami
//!
//! The API refuses unsigned calls. A priming request to the home page sets
//! the `xm_sg_tk` cookie; its first segment signs every later query as
//! `md5("{token}_xmMain_{path}_{q}")`.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::api::http::{HttpClient, HttpOptions, HttpRequest};
use crate::api::ncm_api::model::get_val;
use crate::fallback::source::{
    Candidate, Resolved, SourceAdapter, SourceError, SourceName, TrackQuery, disguise,
    first_match, get_body, id_string, parse_json, size_of,
};

const HOME_URL: &str = "https://www.xiami.com";
const SEARCH_PATH: &str = "/api/search/searchSongs";
const PLAY_INFO_PATH: &str = "/api/song/getPlayInfo";
const TOKEN_COOKIE: &str = "xm_sg_tk";

#[derive(Debug, Clone, Copy, Default)]
pub struct Xiami;

impl Xiami {
    fn sign(cookie: &str, path: &str, q: &str) -> String {
        let token = cookie.split('_').next().unwrap_or_default();
        format!("{:x}", md5::compute(format!("{}_xmMain_{}_{}", token, path, q)))
    }

    fn signed_request(cookie: &str, path: &str, q: &str) -> HttpRequest {
        let url = format!(
            "{}{}?_q={}&_s={}",
            HOME_URL,
            path,
            urlencoding::encode(q),
            Self::sign(cookie, path, q)
        );
        disguise(HttpRequest::get(url))
            .header("Referer", "https://www.xiami.com/")
            .header("Cookie", format!("{}={}", TOKEN_COOKIE, cookie))
    }

    async fn handshake(http: &dyn HttpClient) -> Result<String, SourceError> {
        let response = http
            .request(disguise(HttpRequest::get(HOME_URL)))
            .await
            .map_err(SourceError::unavailable)?;
        response
            .cookie(TOKEN_COOKIE)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SourceError::Unavailable("xiami handshake set no token".into()))
    }
}

#[async_trait]
impl SourceAdapter for Xiami {
    fn name(&self) -> SourceName {
        SourceName::Xiami
    }

    fn http_options(&self) -> HttpOptions {
        HttpOptions {
            cookie_jar: true,
            ..Default::default()
        }
    }

    async fn search(
        &self,
        http: &dyn HttpClient,
        query: &TrackQuery,
    ) -> Result<Option<Candidate>, SourceError> {
        let cookie = Self::handshake(http).await?;
        let q = json!({
            "key": query.keyword(),
            "pagingVO": { "page": 1, "pageSize": 60 },
        })
        .to_string();
        let body = get_body(http, Self::signed_request(&cookie, SEARCH_PATH, &q)).await?;
        let value = parse_json(&body)?;

        let empty = Vec::new();
        let songs: &Vec<Value> = get_val!(&value, "result", "data", "songs").unwrap_or(&empty);
        let hit = first_match(songs, &query.title, |v| {
            get_val!(@as String, v, "songName").ok()
        });
        Ok(hit.and_then(|v| v.get("songId")).and_then(id_string).map(|id| Candidate {
            id,
            token: Some(cookie),
            ..Default::default()
        }))
    }

    async fn resolve(
        &self,
        http: &dyn HttpClient,
        candidate: &Candidate,
    ) -> Result<Option<Resolved>, SourceError> {
        let cookie = candidate
            .token
            .as_deref()
            .ok_or_else(|| SourceError::Unavailable("xiami candidate without token".into()))?;
        let song_id: Value = candidate
            .id
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(candidate.id.clone()));
        let q = json!({ "songIds": [song_id] }).to_string();
        let body = get_body(http, Self::signed_request(cookie, PLAY_INFO_PATH, &q)).await?;
        let value = parse_json(&body)?;

        let empty = Vec::new();
        let play_infos: &Vec<Value> = value
            .pointer("/result/data/songPlayInfos/0/playInfos")
            .and_then(|v| v.as_array())
            .unwrap_or(&empty);
        Ok(play_infos.iter().find_map(|info| {
            let url: String = get_val!(info, "listenFile").ok()?;
            (!url.is_empty()).then(|| Resolved {
                url,
                size_bytes: size_of(info.get("fileSize")),
            })
        }))
    }
}
