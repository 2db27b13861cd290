//! Stream URL assembly helpers

use crate::error::PlayerError;
use rand::Rng;

/// Characters allowed in a content playback nonce
const CPN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Length of a content playback nonce
const CPN_LENGTH: usize = 16;

/// Parameter name used when a cipher does not carry `sp`
pub const DEFAULT_SIGNATURE_PARAM: &str = "signature";

/// Components of a `signatureCipher` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCipher {
    /// Stream URL without the signature
    pub url: String,
    /// Obfuscated signature (`s`)
    pub signature: String,
    /// Query parameter the signature belongs in (`sp`)
    pub signature_param: String,
}

/// Where a stream format's URL comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatUrl {
    /// Plain URL
    Direct(String),
    /// Form-encoded `signatureCipher`
    Cipher(String),
}

/// Parse a form-encoded `signatureCipher`
pub fn parse_cipher(cipher: &str) -> Result<SignatureCipher, PlayerError> {
    let mut url = None;
    let mut signature = None;
    let mut signature_param = None;

    for (key, value) in url::form_urlencoded::parse(cipher.as_bytes()) {
        match key.as_ref() {
            "url" => url = Some(value.into_owned()),
            "s" => signature = Some(value.into_owned()),
            "sp" => signature_param = Some(value.into_owned()),
            _ => {}
        }
    }

    let url = url.ok_or_else(|| PlayerError::InvalidUrl("Cipher has no url".to_string()))?;
    Ok(SignatureCipher {
        url,
        signature: signature.unwrap_or_default(),
        signature_param: signature_param
            .filter(|param| !param.is_empty())
            .unwrap_or_else(|| DEFAULT_SIGNATURE_PARAM.to_string()),
    })
}

/// Append the signature to the cipher URL
pub fn cipher_url(cipher: &SignatureCipher, signature: &str) -> String {
    format!("{}&{}={}", cipher.url, cipher.signature_param, signature)
}

/// Append the playback nonce and, when present, the streaming token
pub fn finalize_stream_url(url: &str, cpn: &str, po_token: Option<&str>) -> String {
    let mut url = format!("{}&cpn={}", url, cpn);
    if let Some(token) = po_token {
        url.push_str("&pot=");
        url.push_str(token);
    }
    url
}

/// Generate a random content playback nonce
pub fn generate_content_playback_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..CPN_LENGTH)
        .map(|_| CPN_ALPHABET[rng.gen_range(0..CPN_ALPHABET.len())] as char)
        .collect()
}
