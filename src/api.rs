//! Netease Cloud Music API module
//!
//! Signed requests against the primary catalog, plus the plain HTTP
//! transport and request-disguise helpers shared with the fallback sources.

pub mod agent;
pub mod http;
mod ncm;
pub mod ncm_api;

pub use http::{HttpClient, HttpClientFactory, HttpOptions, HttpRequest, HttpResponse, ReqwestFactory};
pub use ncm::{DEFAULT_BITRATE, DETAIL_SUBSCRIBERS, NcmCatalog, PlayListField, TrackCatalog};
pub use ncm_api::model::{
    PlayListCategory, PlayListDetail, PlayListTag, PlayableStatus, SongList, SongUrl, TrackMeta,
};
pub use ncm_api::{CryptoApi, MusicApi, RequestProfile, SignedRequest};
