//! Encryption utilities for NCM API
//!
//! Implements weapi, eapi, and linuxapi encryption schemes.

use aes::Aes128;
use aes::cipher::{BlockEncryptMut, KeyInit, KeyIvInit, block_padding::Pkcs7};
use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use lazy_static::lazy_static;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};

lazy_static! {
    static ref IV: Vec<u8> = "0102030405060708".as_bytes().to_vec();
    static ref PRESET_KEY: Vec<u8> = "0CoJUm6Qyw8W8jud".as_bytes().to_vec();
    static ref LINUX_API_KEY: Vec<u8> = "rFgB&h#%2?^eDg:Q".as_bytes().to_vec();
    static ref BASE62: Vec<u8> = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".as_bytes().to_vec();
    static ref EAPIKEY: Vec<u8> = "e82ckenh8dichen8".as_bytes().to_vec();
}

const RSA_PUBLIC_KEY: &str = "-----BEGIN PUBLIC KEY-----
MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQDgtQn2JZ34ZC28NWYpAUd98iZ3
7BUrX/aKzmFbt7clFSs6sXqHauqKWqdtLkF2KexO40H1YTX8z2lSgBBOAxLsvakl
V8k4cBFK9snQXE9/DDaFt6Rr7iVZMldczhC0JNgTz+SHXT6CBHuX3e9SdB1Ua44o
ncaTWz7OBGLbCiK45wIDAQAB
-----END PUBLIC KEY-----";

pub struct Crypto;

pub enum AesMode {
    Cbc,
    Ecb,
}

impl Crypto {
    pub fn eapi(url: &str, text: &str) -> Result<String> {
        let message = format!("nobody{}use{}md5forencrypt", url, text);
        let digest = format!("{:x}", md5::compute(message.as_bytes()));
        let data = format!("{}-36cd479b6b5-{}-36cd479b6b5-{}", url, text, digest);
        let params = hex::encode_upper(Crypto::aes_encrypt(&data, &EAPIKEY, AesMode::Ecb, None)?);
        Ok(format!("params={}", urlencoding::encode(&params)))
    }

    pub fn weapi(text: &str) -> Result<String> {
        let mut secret_key = [0u8; 16];
        rand::fill(&mut secret_key[..]);
        let key: Vec<u8> = secret_key
            .iter()
            .map(|i| BASE62[(i % 62) as usize])
            .collect();

        let params1 = general_purpose::STANDARD.encode(Crypto::aes_encrypt(
            text,
            &PRESET_KEY,
            AesMode::Cbc,
            Some(&IV[..]),
        )?);
        let params = general_purpose::STANDARD.encode(Crypto::aes_encrypt(
            &params1,
            &key,
            AesMode::Cbc,
            Some(&IV[..]),
        )?);

        let reversed: Vec<u8> = key.iter().rev().copied().collect();
        let enc_sec_key = Crypto::rsa_encrypt(&reversed, RSA_PUBLIC_KEY)?;

        Ok(format!(
            "params={}&encSecKey={}",
            urlencoding::encode(&params),
            urlencoding::encode(&enc_sec_key)
        ))
    }

    pub fn linuxapi(text: &str) -> Result<String> {
        let params =
            hex::encode_upper(Crypto::aes_encrypt(text, &LINUX_API_KEY, AesMode::Ecb, None)?);
        Ok(format!("eparams={}", urlencoding::encode(&params)))
    }

    pub fn aes_encrypt(data: &str, key: &[u8], mode: AesMode, iv: Option<&[u8]>) -> Result<Vec<u8>> {
        match mode {
            AesMode::Cbc => {
                let iv = iv.ok_or_else(|| anyhow!("CBC mode requires an IV"))?;
                let encryptor = cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
                    .map_err(|e| anyhow!("Invalid AES key/IV: {}", e))?;
                pad_encrypt(encryptor, data.as_bytes())
            }
            AesMode::Ecb => {
                let encryptor = ecb::Encryptor::<Aes128>::new_from_slice(key)
                    .map_err(|e| anyhow!("Invalid AES key: {}", e))?;
                pad_encrypt(encryptor, data.as_bytes())
            }
        }
    }

    /// Textbook RSA (no padding), left-padded to 128 bytes and hex-encoded
    pub fn rsa_encrypt(data: &[u8], pem: &str) -> Result<String> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| anyhow!("Invalid RSA public key: {}", e))?;
        let message = BigUint::from_bytes_be(data);
        let cipher = message.modpow(key.e(), key.n());
        Ok(format!("{:0>256}", hex::encode(cipher.to_bytes_be())))
    }
}

fn pad_encrypt<E: BlockEncryptMut>(encryptor: E, data: &[u8]) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; data.len() + 16];
    buf[..data.len()].copy_from_slice(data);
    let len = encryptor
        .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
        .map_err(|_| anyhow!("AES padding failed"))?
        .len();
    buf.truncate(len);
    Ok(buf)
}
