//! OAuth 1.0a request signing (HMAC-SHA1) for the Connect token endpoints.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use sha1::Sha1;

use crate::{GarminError, OAuth1Token};

type HmacSha1 = Hmac<Sha1>;

/// Everything except the RFC 3986 unreserved characters.
const OAUTH_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Application credentials the token endpoints are signed with.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct OAuthConsumer {
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl std::fmt::Debug for OAuthConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConsumer")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"[REDACTED]")
            .finish()
    }
}

/// Per-request values that make a signature unique.
pub struct Nonce<'a> {
    pub nonce: &'a str,
    pub timestamp: i64,
}

pub fn encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE).to_string()
}

/// Signature base string: method, base URL and the sorted, encoded
/// parameter set (query, form body and `oauth_*` values together).
pub fn signature_base(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> =
        params.iter().map(|(k, v)| (encode(k), encode(v))).collect();
    encoded.sort();
    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(url),
        encode(&normalized)
    )
}

pub fn sign(
    base: &str,
    consumer_secret: &str,
    token_secret: Option<&str>,
) -> Result<String, GarminError> {
    let key = format!(
        "{}&{}",
        encode(consumer_secret),
        encode(token_secret.unwrap_or_default())
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| GarminError::Protocol(format!("oauth1 signing key: {e}")))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// `Authorization: OAuth …` value for a request. `params` are the query
/// and form parameters the request carries; they are signed, not repeated
/// in the header.
pub fn authorization_header(
    consumer: &OAuthConsumer,
    token: Option<&OAuth1Token>,
    method: &str,
    url: &str,
    params: &[(&str, &str)],
    nonce: Nonce<'_>,
) -> Result<String, GarminError> {
    let timestamp = nonce.timestamp.to_string();
    let mut oauth: Vec<(&str, &str)> = vec![
        ("oauth_consumer_key", consumer.consumer_key.as_str()),
        ("oauth_nonce", nonce.nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_version", "1.0"),
    ];
    if let Some(token) = token {
        oauth.push(("oauth_token", token.oauth_token.as_str()));
    }

    let all: Vec<(&str, &str)> = params.iter().chain(oauth.iter()).copied().collect();
    let base = signature_base(method, url, &all);
    let signature = sign(
        &base,
        &consumer.consumer_secret,
        token.map(|t| t.oauth_token_secret.as_str()),
    )?;
    oauth.push(("oauth_signature", signature.as_str()));
    oauth.sort();

    let fields = oauth
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {fields}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Worked example from Twitter's "Creating a signature" guide.
    const STATUS: &str = "Hello Ladies + Gentlemen, a signed OAuth request!";
    const URL: &str = "https://api.twitter.com/1.1/statuses/update.json";

    fn example_params() -> Vec<(&'static str, &'static str)> {
        vec![
            ("status", STATUS),
            ("include_entities", "true"),
            ("oauth_consumer_key", "xvz1evFS4wEEPTGEFPHBog"),
            ("oauth_nonce", "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1318622958"),
            ("oauth_token", "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
            ("oauth_version", "1.0"),
        ]
    }

    #[test]
    fn encode_keeps_only_unreserved() {
        assert_eq!(encode("a-b._~c"), "a-b._~c");
        assert_eq!(encode("Ladies + Gentlemen!"), "Ladies%20%2B%20Gentlemen%21");
        assert_eq!(encode("https://x/y"), "https%3A%2F%2Fx%2Fy");
    }

    #[test]
    fn signature_base_matches_reference() {
        let base = signature_base("post", URL, &example_params());
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&\
include_entities%3Dtrue%26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog%26\
oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg%26\
oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1318622958%26\
oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb%26\
oauth_version%3D1.0%26status%3DHello%2520Ladies%2520%252B%2520Gentlemen\
%252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
    }

    #[test]
    fn signature_matches_reference() {
        let base = signature_base("POST", URL, &example_params());
        let sig = sign(
            &base,
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            Some("LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"),
        )
        .unwrap();
        assert_eq!(sig, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn header_lists_oauth_fields_only() {
        let consumer = OAuthConsumer {
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
        };
        let token = OAuth1Token {
            oauth_token: "tok".into(),
            oauth_token_secret: "tok-secret".into(),
            mfa_token: None,
            domain: None,
        };
        let header = authorization_header(
            &consumer,
            Some(&token),
            "POST",
            "https://connectapi.garmin.com/oauth-service/oauth/exchange/user/2.0",
            &[("mfa_token", "m1")],
            Nonce {
                nonce: "abc",
                timestamp: 1_700_000_000,
            },
        )
        .unwrap();
        assert!(header.starts_with("OAuth oauth_consumer_key=\"ck\", oauth_nonce=\"abc\", "));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(header.contains("oauth_token=\"tok\""));
        assert!(header.contains("oauth_timestamp=\"1700000000\""));
        assert!(!header.contains("tok-secret"));
        assert!(!header.contains("mfa_token"));
    }

    #[test]
    fn signature_depends_on_token_secret() {
        let base = signature_base("GET", "https://x/y", &[("a", "1")]);
        let without = sign(&base, "cs", None).unwrap();
        let with = sign(&base, "cs", Some("ts")).unwrap();
        assert_ne!(without, with);
    }

    #[test]
    fn consumer_debug_is_redacted() {
        let consumer = OAuthConsumer {
            consumer_key: "ck".into(),
            consumer_secret: "very-secret".into(),
        };
        assert!(!format!("{consumer:?}").contains("very-secret"));
    }
}
