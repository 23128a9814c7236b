//! Migu
//!
//! Keyed search on the mobile site; the play-info endpoint only accepts a
//! payload encrypted the way the web player does it (OpenSSL-style salted
//! AES-256-CBC under a fixed passphrase).

use aes::Aes256;
use aes::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{Value, json};

use crate::api::http::{HttpClient, HttpRequest};
use crate::api::ncm_api::model::get_val;
use crate::fallback::source::{
    Candidate, Resolved, SourceAdapter, SourceError, SourceName, TrackQuery, disguise,
    first_match, get_body, id_string, parse_json, size_of,
};

const SEARCH_URL: &str = "https://m.music.migu.cn/migu/remoting/scr_search_tag";
const PLAY_INFO_URL: &str = "https://music.migu.cn/v3/api/music/audioPlayer/getPlayInfo";

const PASSPHRASE: &[u8] = b"4ea5c508a6566e76240543f8feb06fd457777be39549c4016436afda65d2330e";
const SALT: [u8; 8] = [0x6d, 0x69, 0x67, 0x75, 0x5f, 0x70, 0x6c, 0x79];

#[derive(Debug, Clone, Copy, Default)]
pub struct Migu;

impl Migu {
    /// EVP_BytesToKey with MD5 and one round: 32-byte key, 16-byte IV
    fn derive_key_iv() -> ([u8; 32], [u8; 16]) {
        let mut material = Vec::with_capacity(48);
        let mut block: Vec<u8> = Vec::new();
        while material.len() < 48 {
            let mut input = block.clone();
            input.extend_from_slice(PASSPHRASE);
            input.extend_from_slice(&SALT);
            block = md5::compute(&input).0.to_vec();
            material.extend_from_slice(&block);
        }
        let mut key = [0u8; 32];
        let mut iv = [0u8; 16];
        key.copy_from_slice(&material[..32]);
        iv.copy_from_slice(&material[32..48]);
        (key, iv)
    }

    /// `base64("Salted__" ‖ salt ‖ ciphertext)`
    fn encrypt_payload(payload: &str) -> Result<String, SourceError> {
        let (key, iv) = Self::derive_key_iv();
        let encryptor = cbc::Encryptor::<Aes256>::new_from_slices(&key, &iv)
            .map_err(SourceError::parse)?;
        let data = payload.as_bytes();
        let mut buf = vec![0u8; data.len() + 16];
        buf[..data.len()].copy_from_slice(data);
        let cipher_text = encryptor
            .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
            .map_err(|_| SourceError::Parse("payload padding failed".into()))?;

        let mut out = Vec::with_capacity(16 + cipher_text.len());
        out.extend_from_slice(b"Salted__");
        out.extend_from_slice(&SALT);
        out.extend_from_slice(cipher_text);
        Ok(general_purpose::STANDARD.encode(out))
    }
}

#[async_trait]
impl SourceAdapter for Migu {
    fn name(&self) -> SourceName {
        SourceName::Migu
    }

    async fn search(
        &self,
        http: &dyn HttpClient,
        query: &TrackQuery,
    ) -> Result<Option<Candidate>, SourceError> {
        let url = format!(
            "{}?keyword={}&type=2&rows=20&pgc=1",
            SEARCH_URL,
            query.encoded_keyword()
        );
        let request = disguise(HttpRequest::get(url)).header("Referer", "https://m.music.migu.cn/");
        let value = parse_json(&get_body(http, request).await?)?;

        let empty = Vec::new();
        let musics: &Vec<Value> = get_val!(&value, "musics").unwrap_or(&empty);
        let hit = first_match(musics, &query.title, |v| {
            get_val!(@as String, v, "songName").ok()
        });
        Ok(hit
            .and_then(|v| v.get("copyrightId"))
            .and_then(id_string)
            .map(Candidate::new))
    }

    async fn resolve(
        &self,
        http: &dyn HttpClient,
        candidate: &Candidate,
    ) -> Result<Option<Resolved>, SourceError> {
        let payload = json!({ "copyrightId": candidate.id, "type": 2 }).to_string();
        let data = Self::encrypt_payload(&payload)?;
        let url = format!(
            "{}?dataType=2&data={}",
            PLAY_INFO_URL,
            urlencoding::encode(&data)
        );
        let request = disguise(HttpRequest::get(url))
            .header("Referer", "https://music.migu.cn/v3/music/player/audio");
        let value = parse_json(&get_body(http, request).await?)?;

        let play_url: String = get_val!(&value, "data", "playUrl").unwrap_or_default();
        if play_url.is_empty() {
            return Ok(None);
        }
        let url = if play_url.starts_with("//") {
            format!("http:{}", play_url)
        } else {
            play_url
        };
        Ok(Some(Resolved {
            url,
            size_bytes: size_of(value.get("data").and_then(|d| d.get("size"))),
        }))
    }
}
