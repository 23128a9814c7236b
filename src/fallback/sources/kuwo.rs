//! Kuwo
//!
//! Search answers only when the `kw_token` cookie from a prior page load is
//! echoed back in the `csrf` header. Resolving goes through the anti-leech
//! converter, whose body is the bare URL.

use async_trait::async_trait;
use serde_json::Value;

use crate::api::http::{HttpClient, HttpOptions, HttpRequest};
use crate::api::ncm_api::model::get_val;
use crate::fallback::source::{
    Candidate, Resolved, SourceAdapter, SourceError, SourceName, TrackQuery, disguise,
    first_match, get_body, id_string, parse_json,
};

const PRIME_URL: &str = "http://www.kuwo.cn/search/list";
const SEARCH_URL: &str = "http://www.kuwo.cn/api/www/search/searchMusicBykeyWord";
const CONVERT_URL: &str = "http://antiserver.kuwo.cn/anti.s";
const TOKEN_COOKIE: &str = "kw_token";

#[derive(Debug, Clone, Copy, Default)]
pub struct Kuwo;

#[async_trait]
impl SourceAdapter for Kuwo {
    fn name(&self) -> SourceName {
        SourceName::Kuwo
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
        let keyword = query.encoded_keyword();
        let referer = format!("{}?key={}", PRIME_URL, keyword);
        let primed = http
            .request(disguise(HttpRequest::get(referer.clone())))
            .await
            .map_err(SourceError::unavailable)?;
        let token = primed
            .cookie(TOKEN_COOKIE)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SourceError::Unavailable("kuwo handshake set no token".into()))?;

        let url = format!("{}?key={}&pn=1&rn=30", SEARCH_URL, keyword);
        let request = disguise(HttpRequest::get(url))
            .header("Referer", referer)
            .header("csrf", token.clone())
            .header("Cookie", format!("{}={}", TOKEN_COOKIE, token));
        let value = parse_json(&get_body(http, request).await?)?;

        let empty = Vec::new();
        let list: &Vec<Value> = get_val!(&value, "data", "list").unwrap_or(&empty);
        let hit = first_match(list, &query.title, |v| get_val!(@as String, v, "name").ok());
        Ok(hit.and_then(|v| v.get("rid")).and_then(id_string).map(|rid| Candidate {
            id: rid.trim_start_matches("MUSIC_").to_string(),
            token: Some(token),
            ..Default::default()
        }))
    }

    async fn resolve(
        &self,
        http: &dyn HttpClient,
        candidate: &Candidate,
    ) -> Result<Option<Resolved>, SourceError> {
        let url = format!(
            "{}?type=convert_url&format=mp3&response=url&rid=MUSIC_{}",
            CONVERT_URL, candidate.id
        );
        let body = get_body(http, disguise(HttpRequest::get(url))).await?;
        let url = body.trim();
        if !url.starts_with("http") {
            return Ok(None);
        }
        Ok(Some(Resolved {
            url: url.to_string(),
            size_bytes: 0,
        }))
    }
}
