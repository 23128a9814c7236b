//! Kugou
//!
//! Callback-wrapped search keyed by file hash; the tracker signs requests
//! with `md5(hash + "kgcloudv2")`.

use async_trait::async_trait;
use serde_json::Value;

use crate::api::http::{HttpClient, HttpRequest};
use crate::api::ncm_api::model::get_val;
use crate::fallback::source::{
    Candidate, Resolved, SourceAdapter, SourceError, SourceName, TrackQuery, disguise,
    first_match, get_body, id_string, parse_json, size_of, unwrap_callback,
};

const SEARCH_URL: &str = "http://songsearch.kugou.com/song_search_v2";
const TRACKER_URL: &str = "http://trackercdn.kugou.com/i/v2/";

#[derive(Debug, Clone, Copy, Default)]
pub struct Kugou;

impl Kugou {
    fn tracker_key(hash: &str) -> String {
        format!("{:x}", md5::compute(format!("{}kgcloudv2", hash)))
    }
}

#[async_trait]
impl SourceAdapter for Kugou {
    fn name(&self) -> SourceName {
        SourceName::Kugou
    }

    async fn search(
        &self,
        http: &dyn HttpClient,
        query: &TrackQuery,
    ) -> Result<Option<Candidate>, SourceError> {
        let url = format!(
            "{}?keyword={}&page=1&pagesize=10&platform=WebFilter&callback=cb",
            SEARCH_URL,
            query.encoded_keyword()
        );
        let body = get_body(http, disguise(HttpRequest::get(url))).await?;
        let value = unwrap_callback(&body)?;

        let empty = Vec::new();
        let lists: &Vec<Value> = get_val!(&value, "data", "lists").unwrap_or(&empty);
        let hit = first_match(lists, &query.title, |v| {
            get_val!(@as String, v, "SongName").ok()
        });
        Ok(hit.and_then(|v| {
            let hash = v.get("FileHash").and_then(id_string)?;
            Some(Candidate {
                id: hash.to_lowercase(),
                size_bytes: size_of(v.get("FileSize")),
                ..Default::default()
            })
        }))
    }

    async fn resolve(
        &self,
        http: &dyn HttpClient,
        candidate: &Candidate,
    ) -> Result<Option<Resolved>, SourceError> {
        let url = format!(
            "{}?cmd=25&hash={}&key={}&pid=3&behavior=play&appid=1005&version=8990",
            TRACKER_URL,
            candidate.id,
            Self::tracker_key(&candidate.id)
        );
        let value = parse_json(&get_body(http, disguise(HttpRequest::get(url))).await?)?;

        let status: i64 = get_val!(&value, "status").unwrap_or_default();
        if status != 1 {
            return Ok(None);
        }
        let url = value
            .get("url")
            .and_then(|u| u.as_array())
            .and_then(|urls| urls.iter().filter_map(|u| u.as_str()).find(|u| !u.is_empty()))
            .map(String::from);
        let size = match size_of(value.get("fileSize")) {
            0 => candidate.size_bytes,
            n => n,
        };
        Ok(url.map(|url| Resolved {
            url,
            size_bytes: size,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::source::{SourceOutcome, fetch};
    use crate::fallback::testing::FakeHttp;

    fn query() -> TrackQuery {
        TrackQuery {
            track_id: 1,
            title: "小幸运".into(),
            artist: "田馥甄".into(),
        }
    }

    #[tokio::test]
    async fn test_search_and_tracker() {
        let hash = "1A2B3C4D5E6F708192A3B4C5D6E7F809";
        let search = format!(
            r#"cb({{"data":{{"lists":[{{"SongName":"幸运儿","FileHash":"x"}},{{"SongName":"小幸运 (Live)","FileHash":"{}","FileSize":4000000}}]}}}})"#,
            hash
        );
        let http = FakeHttp::new()
            .route("song_search_v2", 200, &search)
            .route(
                "trackercdn",
                200,
                r#"{"status":1,"url":["http://fs.open.kugou.com/a.mp3"],"fileSize":4100000}"#,
            );
        let outcome = fetch(&Kugou, &http, &query()).await;
        assert_eq!(
            outcome,
            SourceOutcome::found(
                SourceName::Kugou,
                Resolved {
                    url: "http://fs.open.kugou.com/a.mp3".into(),
                    size_bytes: 4100000,
                }
            )
        );

        let tracker = &http.requests()[1].url;
        let lower = hash.to_lowercase();
        assert!(tracker.contains(&format!("hash={}", lower)));
        assert!(tracker.contains(&format!("key={}", Kugou::tracker_key(&lower))));
    }

    #[tokio::test]
    async fn test_tracker_refusal_is_empty() {
        let http = FakeHttp::new()
            .route(
                "song_search_v2",
                200,
                r#"cb({"data":{"lists":[{"SongName":"小幸运","FileHash":"abc"}]}})"#,
            )
            .route("trackercdn", 200, r#"{"status":2,"error":"need login"}"#);
        let outcome = fetch(&Kugou, &http, &query()).await;
        assert_eq!(outcome, SourceOutcome::empty(SourceName::Kugou));
    }
}
