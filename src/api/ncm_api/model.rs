//! NCM API Model types
//!
//! Data structures for NCM API responses, plus the `get_val!` helper the
//! fallback sources reuse to walk loosely-shaped JSON.

use anyhow::{Ok, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) trait DeVal<'a>: Sized {
    fn dval(v: &'a Value) -> Result<Self>;
}

impl<'a> DeVal<'a> for i64 {
    fn dval(v: &Value) -> Result<Self> {
        Ok(Self::deserialize(v)?)
    }
}

impl<'a> DeVal<'a> for u64 {
    fn dval(v: &Value) -> Result<Self> {
        Ok(Self::deserialize(v)?)
    }
}

impl<'a> DeVal<'a> for String {
    fn dval(v: &Value) -> Result<Self> {
        Ok(Self::deserialize(v)?)
    }
}

impl<'a> DeVal<'a> for &'a Vec<Value> {
    fn dval(v: &'a Value) -> Result<Self> {
        match v {
            Value::Array(v) => Ok(v),
            _ => Err(anyhow!("json not a array")),
        }
    }
}

impl<'a> DeVal<'a> for &'a Value {
    fn dval(v: &'a Value) -> Result<Self> {
        Ok(v)
    }
}

pub(crate) fn get_val_chain<'a, T>(v: &'a Value, names: &[&str]) -> Result<T>
where
    T: DeVal<'a>,
{
    let v = names.iter().fold(std::result::Result::Ok(v), |v, n| {
        v?.get(n)
            .ok_or_else(|| anyhow!("key '{}' not found, in chain {:?}", n, names))
    })?;
    T::dval(v)
}

macro_rules! get_val {
    (@as $t:ty, $v:expr, $($n:expr),+) => {
        anyhow::Context::context(
            $crate::api::ncm_api::model::get_val_chain::<$t>($v, &[$($n),+]),
            format!("at {}:{}", file!(), line!()),
        )
    };
    ($v:expr, $($n:expr),+) => {
        anyhow::Context::context(
            $crate::api::ncm_api::model::get_val_chain($v, &[$($n),+]),
            format!("at {}:{}", file!(), line!()),
        )
    };
}

pub(crate) use get_val;

/// Canonical name and primary artist of a track
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrackMeta {
    pub id: u64,
    pub name: String,
    pub artist: String,
}

/// Parse `/weapi/v3/song/detail`; `None` when the song or its name is missing
pub fn to_track_meta(json: String) -> Result<Option<TrackMeta>> {
    let value = &serde_json::from_str::<Value>(&json)?;
    let code: i64 = get_val!(value, "code")?;
    if code != 200 {
        return Err(anyhow!("song detail returned code {}", code));
    }
    let songs: &Vec<Value> = get_val!(value, "songs")?;
    let Some(song) = songs.first() else {
        return Ok(None);
    };
    let name: String = get_val!(song, "name").unwrap_or_default();
    if name.is_empty() {
        return Ok(None);
    }
    let artist = get_val!(@as &Vec<Value>, song, "ar")
        .ok()
        .and_then(|ar| ar.first())
        .and_then(|a| get_val!(@as String, a, "name").ok())
        .unwrap_or_default();
    Ok(Some(TrackMeta {
        id: get_val!(song, "id")?,
        name,
        artist,
    }))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SongUrl {
    pub id: u64,
    pub url: String,
    pub rate: u32,
}

pub fn to_song_url(json: String) -> Result<Vec<SongUrl>> {
    let value = &serde_json::from_str::<Value>(&json)?;
    let code: i64 = get_val!(value, "code")?;
    if code == 200 {
        let mut vec: Vec<SongUrl> = Vec::new();
        let array: &Vec<Value> = get_val!(value, "data")?;
        for v in array.iter() {
            let url: String = get_val!(v, "url").unwrap_or_default();
            if !url.is_empty() {
                let rate: u64 = get_val!(v, "br").unwrap_or_default();
                vec.push(SongUrl {
                    id: get_val!(v, "id")?,
                    url,
                    rate: rate as u32,
                });
            }
        }
        return Ok(vec);
    }
    Err(anyhow!("none"))
}

/// Licensing answer from the primary catalog for one track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayableStatus {
    Playable,
    /// Only a paid trial snippet is served
    TrialOnly,
    Denied,
}

impl PlayableStatus {
    pub fn playable(&self) -> bool {
        self == &Self::Playable
    }
}

/// Interpret a `song/enhance/player/url` response together with its HTTP status
pub fn to_playable_status(status: u16, json: &str) -> Result<PlayableStatus> {
    if status != 200 {
        return Ok(PlayableStatus::Denied);
    }
    let value = &serde_json::from_str::<Value>(json)?;
    let data: &Vec<Value> = get_val!(value, "data")?;
    let Some(first) = data.first() else {
        return Ok(PlayableStatus::Denied);
    };
    let code: i64 = get_val!(first, "code").unwrap_or_default();
    if code != 200 {
        return Ok(PlayableStatus::Denied);
    }
    match first.get("freeTrialInfo") {
        Some(info) if !info.is_null() => Ok(PlayableStatus::TrialOnly),
        _ => Ok(PlayableStatus::Playable),
    }
}

/// Fail unless the response carries `code == 200`, surfacing `msg` if any
pub fn to_msg(json: String) -> Result<()> {
    let value = &serde_json::from_str::<Value>(&json)?;
    let code: i64 = get_val!(value, "code")?;
    if code == 200 {
        return Ok(());
    }
    let msg: String = get_val!(value, "msg")
        .or_else(|_| get_val!(value, "message"))
        .unwrap_or_default();
    Err(anyhow!("code {}: {}", code, msg))
}

/// Parse a `/weapi/batch` response; every sub-request must have succeeded
pub fn to_batch_result(json: String, keys: &[&str]) -> Result<()> {
    let value = &serde_json::from_str::<Value>(&json)?;
    let code: i64 = get_val!(value, "code")?;
    if code != 200 {
        return Err(anyhow!("batch returned code {}", code));
    }
    for key in keys {
        let code: i64 = get_val!(value, *key, "code")?;
        if code != 200 {
            return Err(anyhow!("{} returned code {}", key, code));
        }
    }
    Ok(())
}

fn first_artist(song: &Value) -> String {
    get_val!(@as &Vec<Value>, song, "ar")
        .or_else(|_| get_val!(@as &Vec<Value>, song, "artists"))
        .ok()
        .and_then(|ar| ar.first())
        .and_then(|a| get_val!(@as String, a, "name").ok())
        .unwrap_or_default()
}

fn to_track_list(array: &[Value]) -> Vec<TrackMeta> {
    array
        .iter()
        .filter_map(|v| {
            Some(TrackMeta {
                id: get_val!(v, "id").ok()?,
                name: get_val!(v, "name").unwrap_or_default(),
                artist: first_artist(v),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlayListDetail {
    pub id: u64,
    pub name: String,
    pub cover_img_url: String,
    pub description: String,
    pub tags: Vec<String>,
    pub creator: String,
    pub track_count: u64,
    pub songs: Vec<TrackMeta>,
}

/// Parse `/weapi/v3/playlist/detail`
pub fn to_playlist_detail(json: String) -> Result<PlayListDetail> {
    let value = &serde_json::from_str::<Value>(&json)?;
    let code: i64 = get_val!(value, "code")?;
    if code != 200 {
        return Err(anyhow!("playlist detail returned code {}", code));
    }
    let playlist: &Value = get_val!(value, "playlist")?;
    let tags = get_val!(@as &Vec<Value>, playlist, "tags")
        .map(|tags| tags.iter().filter_map(|t| t.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let songs = get_val!(@as &Vec<Value>, playlist, "tracks")
        .map(|tracks| to_track_list(tracks))
        .unwrap_or_default();
    Ok(PlayListDetail {
        id: get_val!(playlist, "id")?,
        name: get_val!(playlist, "name")?,
        cover_img_url: get_val!(playlist, "coverImgUrl").unwrap_or_default(),
        description: get_val!(playlist, "description").unwrap_or_default(),
        tags,
        creator: get_val!(playlist, "creator", "nickname").unwrap_or_default(),
        track_count: get_val!(playlist, "trackCount").unwrap_or_default(),
        songs,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlayListCategory {
    pub name: String,
    /// Name of the group this category sits in, e.g. "语种"
    pub group: String,
    pub hot: bool,
}

/// Parse `/weapi/playlist/catalogue`
pub fn to_playlist_categories(json: String) -> Result<Vec<PlayListCategory>> {
    let value = &serde_json::from_str::<Value>(&json)?;
    let code: i64 = get_val!(value, "code")?;
    if code != 200 {
        return Err(anyhow!("playlist catalogue returned code {}", code));
    }
    let groups: &Value = get_val!(value, "categories")?;
    let subs: &Vec<Value> = get_val!(value, "sub")?;
    Ok(subs
        .iter()
        .filter_map(|v| {
            let group = v
                .get("category")
                .and_then(|c| c.as_u64())
                .and_then(|c| groups.get(c.to_string()))
                .and_then(|g| g.as_str())
                .unwrap_or_default()
                .to_string();
            Some(PlayListCategory {
                name: get_val!(v, "name").ok()?,
                group,
                hot: v.get("hot").and_then(|h| h.as_bool()).unwrap_or(false),
            })
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlayListTag {
    pub id: u64,
    pub name: String,
}

/// Parse `/weapi/playlist/hottags`
pub fn to_hot_tags(json: String) -> Result<Vec<PlayListTag>> {
    let value = &serde_json::from_str::<Value>(&json)?;
    let code: i64 = get_val!(value, "code")?;
    if code != 200 {
        return Err(anyhow!("hot tags returned code {}", code));
    }
    let tags: &Vec<Value> = get_val!(value, "tags")?;
    Ok(tags
        .iter()
        .filter_map(|v| {
            Some(PlayListTag {
                id: get_val!(v, "id").ok()?,
                name: get_val!(v, "name").ok()?,
            })
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SongList {
    pub id: u64,
    pub name: String,
    pub cover_img_url: String,
    pub author: String,
}

/// Parse `/weapi/v1/discovery/recommend/resource`
pub fn to_recommend_resource(json: String) -> Result<Vec<SongList>> {
    let value = &serde_json::from_str::<Value>(&json)?;
    let code: i64 = get_val!(value, "code")?;
    if code != 200 {
        return Err(anyhow!("recommend resource returned code {}", code));
    }
    let array: &Vec<Value> = get_val!(value, "recommend")?;
    let mut vec: Vec<SongList> = Vec::new();
    for v in array.iter() {
        vec.push(SongList {
            id: get_val!(v, "id")?,
            name: get_val!(v, "name")?,
            cover_img_url: get_val!(v, "picUrl").unwrap_or_default(),
            author: get_val!(v, "creator", "nickname").unwrap_or_default(),
        });
    }
    Ok(vec)
}

/// Parse `/weapi/v1/discovery/recommend/songs`
///
/// Older responses list songs under `recommend` with `artists`, newer ones
/// under `data.dailySongs` with `ar`.
pub fn to_recommend_songs(json: String) -> Result<Vec<TrackMeta>> {
    let value = &serde_json::from_str::<Value>(&json)?;
    let code: i64 = get_val!(value, "code")?;
    if code != 200 {
        return Err(anyhow!("recommend songs returned code {}", code));
    }
    let array: &Vec<Value> = get_val!(value, "recommend")
        .or_else(|_| get_val!(value, "data", "dailySongs"))?;
    Ok(to_track_list(array))
}
