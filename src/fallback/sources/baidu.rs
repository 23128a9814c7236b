//! Baidu (Qianqian)
//!
//! Both endpoints answer with a callback-wrapped payload.

use async_trait::async_trait;
use serde_json::Value;

use crate::api::http::{HttpClient, HttpRequest};
use crate::api::ncm_api::model::get_val;
use crate::fallback::source::{
    Candidate, Resolved, SourceAdapter, SourceError, SourceName, TrackQuery, disguise,
    first_match, get_body, id_string, size_of, unwrap_callback,
};

const API_URL: &str = "http://musicapi.qianqian.com/v1/restserver/ting";

#[derive(Debug, Clone, Copy, Default)]
pub struct Baidu;

#[async_trait]
impl SourceAdapter for Baidu {
    fn name(&self) -> SourceName {
        SourceName::Baidu
    }

    async fn search(
        &self,
        http: &dyn HttpClient,
        query: &TrackQuery,
    ) -> Result<Option<Candidate>, SourceError> {
        let url = format!(
            "{}?method=baidu.ting.search.catalogSug&query={}&format=json&from=webapp_music&callback=cb",
            API_URL,
            query.encoded_keyword()
        );
        let body = get_body(http, disguise(HttpRequest::get(url))).await?;
        let value = unwrap_callback(&body)?;

        let empty = Vec::new();
        let songs: &Vec<Value> = get_val!(&value, "song").unwrap_or(&empty);
        let hit = first_match(songs, &query.title, |v| {
            get_val!(@as String, v, "songname").ok()
        });
        Ok(hit
            .and_then(|v| v.get("songid"))
            .and_then(id_string)
            .map(Candidate::new))
    }

    async fn resolve(
        &self,
        http: &dyn HttpClient,
        candidate: &Candidate,
    ) -> Result<Option<Resolved>, SourceError> {
        let url = format!(
            "{}?method=baidu.ting.song.play&songid={}&format=json&from=webapp_music&callback=cb",
            API_URL, candidate.id
        );
        let body = get_body(http, disguise(HttpRequest::get(url))).await?;
        let value = unwrap_callback(&body)?;

        let link: String = get_val!(&value, "bitrate", "file_link").unwrap_or_default();
        if link.is_empty() {
            return Ok(None);
        }
        Ok(Some(Resolved {
            url: link,
            size_bytes: size_of(value.get("bitrate").and_then(|b| b.get("file_size"))),
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
            title: "夜曲".into(),
            artist: "周杰伦".into(),
        }
    }

    #[tokio::test]
    async fn test_unwraps_both_steps() {
        let http = FakeHttp::new()
            .route(
                "catalogSug",
                200,
                r#"cb({"song":[{"songname":"夜曲","songid":"7316463","artistname":"周杰伦"}]});"#,
            )
            .route(
                "song.play",
                200,
                r#"cb({"bitrate":{"file_link":"http://zhangmenshiting.qianqian.com/a.mp3","file_size":5386314}})"#,
            );
        let outcome = fetch(&Baidu, &http, &query()).await;
        assert_eq!(
            outcome,
            SourceOutcome::found(
                SourceName::Baidu,
                Resolved {
                    url: "http://zhangmenshiting.qianqian.com/a.mp3".into(),
                    size_bytes: 5386314,
                }
            )
        );
    }

    #[tokio::test]
    async fn test_unwrapped_body_reads_as_no_match() {
        let http = FakeHttp::new().route(
            "catalogSug",
            200,
            r#"{"song":[{"songname":"夜曲","songid":"7316463"}]}"#,
        );
        let outcome = fetch(&Baidu, &http, &query()).await;
        assert_eq!(outcome, SourceOutcome::empty(SourceName::Baidu));
    }
}
