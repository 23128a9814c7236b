//! Netease Cloud Music API - signed request sender
//!
//! Every call to the primary catalog goes through [`MusicApi::send`], which
//! encrypts the parameters under one of the three request profiles.

mod encrypt;
pub mod model;

use anyhow::{Result, anyhow};
use encrypt::Crypto;
use lazy_static::lazy_static;
pub use model::*;
use parking_lot::RwLock;
use regex::Regex;
use reqwest::{Client, header};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::agent::{LINUX_USER_AGENT, choose_china_ip, choose_user_agent};
pub use super::http::Method;

// Re-export cookie jar for compatibility
pub use reqwest::cookie::Jar as CookieJar;

lazy_static! {
    static ref _CSRF: Regex = Regex::new(r"__csrf=(?P<csrf>[^;\s]+)").unwrap();
}

static BASE_URL: &str = "https://music.163.com";

const LINUX_FORWARD_URL: &str = "https://music.163.com/api/linux/forward";

const TIMEOUT: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoApi {
    Weapi,
    LinuxApi,
    Eapi,
}

/// How a single request is signed and dressed
#[derive(Debug, Clone)]
pub struct RequestProfile {
    pub crypto: CryptoApi,
    /// `"pc"`, `"mobile"`, empty for any, or a literal user agent
    pub ua: String,
    /// Extra cookies sent with this call only
    pub cookies: Vec<(String, String)>,
    /// Overrides the randomly chosen `X-Real-IP`
    pub real_ip: Option<String>,
    /// Logical API path signed into eapi payloads
    pub eapi_url: Option<String>,
}

impl RequestProfile {
    pub fn new(crypto: CryptoApi) -> Self {
        Self {
            crypto,
            ua: String::new(),
            cookies: Vec::new(),
            real_ip: None,
            eapi_url: None,
        }
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn cookies(mut self, cookies: &[(String, String)]) -> Self {
        self.cookies.extend_from_slice(cookies);
        self
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.iter().any(|(k, _)| k == name)
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// An encrypted POST, ready for the wire
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub url: String,
    pub user_agent: String,
    pub body: String,
}

#[derive(Clone)]
pub struct MusicApi {
    client: Client,
    cookie_jar: Arc<CookieJar>,
    csrf: Arc<RwLock<String>>,
}

impl fmt::Debug for MusicApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MusicApi")
            .field("client", &"<HttpClient>")
            .field("csrf", &"<RwLock<String>>")
            .finish()
    }
}

impl MusicApi {
    pub fn new(timeout: Option<Duration>, insecure: bool) -> Result<Self> {
        let cookie_jar = Arc::new(CookieJar::default());
        let client = Self::build_client(&cookie_jar, timeout, None, insecure)?;
        Ok(Self {
            client,
            cookie_jar,
            csrf: Arc::new(RwLock::new(String::new())),
        })
    }

    fn build_client(
        cookie_jar: &Arc<CookieJar>,
        timeout: Option<Duration>,
        proxy: Option<&str>,
        insecure: bool,
    ) -> Result<Client> {
        let base_url: reqwest::Url = BASE_URL.parse()?;
        cookie_jar.add_cookie_str("os=pc; Domain=music.163.com; Path=/", &base_url);
        cookie_jar.add_cookie_str(
            "appver=2.7.1.198277; Domain=music.163.com; Path=/",
            &base_url,
        );

        let mut builder = Client::builder()
            .timeout(timeout.unwrap_or(Duration::from_secs(TIMEOUT)))
            .danger_accept_invalid_certs(insecure)
            .cookie_provider(cookie_jar.clone());
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        builder
            .build()
            .map_err(|e| anyhow!("初始化网络请求失败: {}", e))
    }

    pub fn set_proxy(&mut self, proxy: &str, timeout: Option<Duration>, insecure: bool) -> Result<()> {
        self.client = Self::build_client(&self.cookie_jar, timeout, Some(proxy), insecure)?;
        Ok(())
    }

    /// 从 cookie 字符串提取 CSRF token
    pub fn set_csrf_from_cookies(&self, cookies_str: &str) {
        if let Some(caps) = _CSRF.captures(cookies_str) {
            if let Some(csrf) = caps.name("csrf") {
                *self.csrf.write() = csrf.as_str().to_string();
            }
        }
    }

    pub fn csrf(&self) -> String {
        self.csrf.read().clone()
    }

    fn absolute(url: &str) -> String {
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", BASE_URL, url)
        }
    }

    /// Encrypt `params` under `profile` without sending anything
    pub fn sign(
        &self,
        url: &str,
        params: HashMap<&str, String>,
        profile: &RequestProfile,
    ) -> Result<SignedRequest> {
        let csrf = self.csrf();
        let url = Self::absolute(url);
        let signed = match profile.crypto {
            CryptoApi::Weapi => {
                let mut params = params;
                params.insert("csrf_token", csrf.clone());
                let body = Crypto::weapi(&serde_json::to_string(&params)?)?;
                let target = url.replace("/api/", "/weapi/");
                SignedRequest {
                    url: format!("{}?csrf_token={}", target, csrf),
                    user_agent: choose_user_agent(&profile.ua).to_string(),
                    body,
                }
            }
            CryptoApi::LinuxApi => {
                let data = serde_json::json!({
                    "method": "POST",
                    "url": url.replace("/weapi/", "/api/"),
                    "params": params,
                });
                SignedRequest {
                    url: LINUX_FORWARD_URL.to_string(),
                    user_agent: LINUX_USER_AGENT.to_string(),
                    body: Crypto::linuxapi(&data.to_string())?,
                }
            }
            CryptoApi::Eapi => {
                let mut params = params;
                params.insert("csrf_token", csrf);
                let path = match &profile.eapi_url {
                    Some(path) => path.clone(),
                    None => reqwest::Url::parse(&url)?.path().replace("/eapi/", "/api/"),
                };
                SignedRequest {
                    body: Crypto::eapi(&path, &serde_json::to_string(&params)?)?,
                    url,
                    user_agent: choose_user_agent(&profile.ua).to_string(),
                }
            }
        };
        Ok(signed)
    }

    /// Send a signed request and return `(status, body)`
    ///
    /// `url` may be absolute or a path below `https://music.163.com`.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        params: HashMap<&str, String>,
        profile: &RequestProfile,
    ) -> Result<(u16, String)> {
        let response = match method {
            Method::Post => {
                let signed = self.sign(url, params, profile)?;
                debug!("POST {} ({:?})", signed.url, profile.crypto);
                let mut request = self
                    .client
                    .post(&signed.url)
                    .header(header::ACCEPT, "*/*")
                    .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
                    .header(header::CONNECTION, "keep-alive")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .header(header::REFERER, "https://music.163.com")
                    .header(header::USER_AGENT, signed.user_agent)
                    .header(
                        "X-Real-IP",
                        profile.real_ip.clone().unwrap_or_else(choose_china_ip),
                    )
                    .body(signed.body);
                if let Some(cookie) = profile.cookie_header() {
                    request = request.header(header::COOKIE, cookie);
                }
                request
                    .send()
                    .await
                    .map_err(|e| anyhow!("Request failed: {}", e))?
            }
            Method::Get => self
                .client
                .get(Self::absolute(url))
                .send()
                .await
                .map_err(|e| anyhow!("Request failed: {}", e))?,
        };

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response: {}", e))?;
        Ok((status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csrf_from_cookies() {
        let api = MusicApi::new(None, false).unwrap();
        api.set_csrf_from_cookies("MUSIC_U=abc; __csrf=0123abcd; os=pc");
        assert_eq!(api.csrf(), "0123abcd");

        api.set_csrf_from_cookies("__csrf=beef ; MUSIC_U=x");
        assert_eq!(api.csrf(), "beef");
        api.set_csrf_from_cookies("MUSIC_U=x; __csrf=cafe");
        assert_eq!(api.csrf(), "cafe");
    }

    #[test]
    fn test_sign_weapi() {
        let api = MusicApi::new(None, false).unwrap();
        api.set_csrf_from_cookies("__csrf=tok");
        let mut params = HashMap::new();
        params.insert("ids", "[1]".to_string());
        let signed = api
            .sign("/api/v3/song/detail", params, &RequestProfile::new(CryptoApi::Weapi))
            .unwrap();
        assert_eq!(
            signed.url,
            "https://music.163.com/weapi/v3/song/detail?csrf_token=tok"
        );
        assert!(signed.body.starts_with("params="));
        assert!(signed.body.contains("&encSecKey="));
    }

    #[test]
    fn test_sign_linuxapi_and_eapi_targets() {
        let api = MusicApi::new(None, false).unwrap();
        let signed = api
            .sign(
                "https://music.163.com/weapi/v3/playlist/detail",
                HashMap::new(),
                &RequestProfile::new(CryptoApi::LinuxApi),
            )
            .unwrap();
        assert_eq!(signed.url, LINUX_FORWARD_URL);
        assert_eq!(signed.user_agent, LINUX_USER_AGENT);
        assert!(signed.body.starts_with("eparams="));

        let mut profile = RequestProfile::new(CryptoApi::Eapi);
        profile.eapi_url = Some("/api/playlist/update/name".into());
        let signed = api
            .sign(
                "http://interface3.music.163.com/eapi/playlist/update/name",
                HashMap::new(),
                &profile,
            )
            .unwrap();
        assert_eq!(
            signed.url,
            "http://interface3.music.163.com/eapi/playlist/update/name"
        );
        assert!(signed.body.starts_with("params="));
    }

    #[test]
    fn test_profile_cookie_header() {
        let profile = RequestProfile::new(CryptoApi::Weapi)
            .cookie("os", "pc")
            .cookie("_ntes_nuid", "ff00");
        assert!(profile.has_cookie("os"));
        assert!(!profile.has_cookie("MUSIC_U"));
        assert_eq!(profile.cookie_header().as_deref(), Some("os=pc; _ntes_nuid=ff00"));
        assert_eq!(RequestProfile::new(CryptoApi::Eapi).cookie_header(), None);
    }
}
