//! QQ Music
//!
//! Keyed search, then a vkey request per file type. Not every track carries
//! every encoding, so the resolve step walks a quality ladder and keeps the
//! first type that comes back with a `purl`.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::api::http::{HttpClient, HttpRequest};
use crate::api::ncm_api::model::get_val;
use crate::fallback::source::{
    Candidate, Resolved, SourceAdapter, SourceError, SourceName, TrackQuery, disguise,
    first_match, get_body, id_string, parse_json,
};

const SEARCH_URL: &str = "https://c.y.qq.com/soso/fcgi-bin/client_search_cp";
const VKEY_URL: &str = "https://u.y.qq.com/cgi-bin/musicu.fcg";
const DEFAULT_SIP: &str = "http://ws.stream.qqmusic.qq.com/";
const GUID: &str = "7332953645";

/// File prefix and extension, best first
const QUALITY_LADDER: [(&str, &str); 3] = [("M800", "mp3"), ("M500", "mp3"), ("C400", "m4a")];

#[derive(Debug, Clone, Copy, Default)]
pub struct Qq;

impl Qq {
    fn vkey_request(songmid: &str, filename: &str) -> HttpRequest {
        let data = json!({
            "req_0": {
                "module": "vkey.GetVkeyServer",
                "method": "CgiGetVkey",
                "param": {
                    "guid": GUID,
                    "loginflag": 1,
                    "filename": [filename],
                    "songmid": [songmid],
                    "songtype": [0],
                    "uin": "0",
                    "platform": "20",
                },
            },
        });
        let url = format!(
            "{}?format=json&data={}",
            VKEY_URL,
            urlencoding::encode(&data.to_string())
        );
        disguise(HttpRequest::get(url)).header("Referer", "https://y.qq.com/")
    }
}

#[async_trait]
impl SourceAdapter for Qq {
    fn name(&self) -> SourceName {
        SourceName::Qq
    }

    async fn search(
        &self,
        http: &dyn HttpClient,
        query: &TrackQuery,
    ) -> Result<Option<Candidate>, SourceError> {
        let url = format!(
            "{}?ct=24&qqmusic_ver=1298&remoteplace=txt.yqq.center&t=0&aggr=1&cr=1&catZhida=1&p=1&n=20&w={}&format=json&inCharset=utf8&outCharset=utf-8",
            SEARCH_URL,
            query.encoded_keyword()
        );
        let request = disguise(HttpRequest::get(url)).header("Referer", "https://y.qq.com/");
        let value = parse_json(&get_body(http, request).await?)?;

        let empty = Vec::new();
        let list: &Vec<Value> = get_val!(&value, "data", "song", "list").unwrap_or(&empty);
        let Some(hit) = first_match(list, &query.title, |v| {
            get_val!(@as String, v, "songname").ok()
        }) else {
            return Ok(None);
        };

        let Some(songmid) = hit.get("songmid").and_then(id_string) else {
            return Err(SourceError::Parse("qq entry without songmid".into()));
        };
        let media_mid = hit
            .get("strMediaMid")
            .and_then(id_string)
            .unwrap_or_else(|| songmid.clone());
        let size: u64 = get_val!(hit, "size320").unwrap_or_default();
        Ok(Some(Candidate {
            id: songmid,
            file_id: Some(media_mid),
            size_bytes: size,
            token: None,
        }))
    }

    async fn resolve(
        &self,
        http: &dyn HttpClient,
        candidate: &Candidate,
    ) -> Result<Option<Resolved>, SourceError> {
        let media_mid = candidate.file_id.as_deref().unwrap_or(&candidate.id);
        let mut last_err = None;
        let mut failed = 0;
        for (i, (prefix, ext)) in QUALITY_LADDER.iter().enumerate() {
            let filename = format!("{}{}.{}", prefix, media_mid, ext);
            let request = Self::vkey_request(&candidate.id, &filename);
            let value = match get_body(http, request).await.and_then(|body| parse_json(&body)) {
                Ok(value) => value,
                Err(e) => {
                    debug!("qq: vkey for {} failed: {}", filename, e);
                    failed += 1;
                    last_err = Some(e);
                    continue;
                }
            };

            let purl = value
                .pointer("/req_0/data/midurlinfo/0/purl")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if purl.is_empty() {
                debug!("qq: no {} for {}", filename, candidate.id);
                continue;
            }

            let sip = value
                .pointer("/req_0/data/sip/0")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_SIP);
            return Ok(Some(Resolved {
                url: format!("{}{}", sip, purl),
                size_bytes: if i == 0 { candidate.size_bytes } else { 0 },
            }));
        }
        match last_err {
            Some(e) if failed == QUALITY_LADDER.len() => Err(e),
            _ => Ok(None),
        }
    }
}
