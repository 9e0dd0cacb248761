//! Parsing helpers for the Garmin SSO HTML pages and token payloads.

use std::sync::LazyLock;

use regex::Regex;

use crate::{GarminError, OAuth1Token};

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>(.+?)</title>").expect("valid title regex"));
static TICKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"embed\?ticket=([^"]+)""#).expect("valid ticket regex"));
static CSRF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="_csrf"\s+value="(.+?)""#).expect("valid csrf regex"));

/// What a sign-in or MFA page tells us about the login state.
#[derive(Debug, PartialEq, Eq)]
pub enum SigninPage {
    Success { ticket: String },
    NeedsMfa { csrf_token: String },
}

pub fn page_title(html: &str) -> Option<&str> {
    TITLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

pub fn csrf_token(html: &str) -> Result<String, GarminError> {
    CSRF_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| GarminError::Protocol("csrf token not found in sign-in page".into()))
}

pub fn ticket(html: &str) -> Result<String, GarminError> {
    TICKET_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| GarminError::Protocol("service ticket not found".into()))
}

/// Classify the page returned after submitting credentials or an MFA code.
pub fn classify_signin_page(html: &str) -> Result<SigninPage, GarminError> {
    let title = page_title(html)
        .ok_or_else(|| GarminError::Protocol("sign-in page has no title".into()))?;
    if title == "Success" {
        return Ok(SigninPage::Success {
            ticket: ticket(html)?,
        });
    }
    if title.contains("MFA") {
        return Ok(SigninPage::NeedsMfa {
            csrf_token: csrf_token(html)?,
        });
    }
    Err(GarminError::Auth(format!("unexpected sign-in page: {title}")))
}

/// Parse the form-encoded body returned by the preauthorized endpoint.
pub fn parse_oauth1_body(body: &str) -> Result<OAuth1Token, GarminError> {
    let mut token = None;
    let mut secret = None;
    let mut mfa_token = None;
    for pair in body.trim().split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "oauth_token" => token = Some(value.to_string()),
            "oauth_token_secret" => secret = Some(value.to_string()),
            "mfa_token" => mfa_token = Some(value.to_string()),
            _ => {}
        }
    }
    match (token, secret) {
        (Some(oauth_token), Some(oauth_token_secret)) => Ok(OAuth1Token {
            oauth_token,
            oauth_token_secret,
            mfa_token,
            domain: None,
        }),
        _ => Err(GarminError::Protocol(
            "preauthorized response missing oauth_token".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUCCESS: &str = r#"<html><head><title>Success</title></head>
        <body><script>var url = "https://sso.garmin.com/sso/embed?ticket=ST-123-abc";</script></body></html>"#;
    const MFA: &str = r#"<html><head><title>GARMIN > MFA Challenge</title></head>
        <body><form><input type="hidden" name="_csrf" value="csrf-xyz"/></form></body></html>"#;

    #[test]
    fn success_page_yields_ticket() {
        assert_eq!(
            classify_signin_page(SUCCESS).unwrap(),
            SigninPage::Success {
                ticket: "ST-123-abc".into()
            }
        );
    }

    #[test]
    fn mfa_page_yields_csrf() {
        assert_eq!(
            classify_signin_page(MFA).unwrap(),
            SigninPage::NeedsMfa {
                csrf_token: "csrf-xyz".into()
            }
        );
    }

    #[test]
    fn other_title_is_auth_error() {
        let html = "<html><title>GARMIN Authentication Application</title></html>";
        assert!(matches!(
            classify_signin_page(html),
            Err(GarminError::Auth(_))
        ));
    }

    #[test]
    fn missing_title_is_protocol_error() {
        assert!(matches!(
            classify_signin_page("<html></html>"),
            Err(GarminError::Protocol(_))
        ));
    }

    #[test]
    fn oauth1_body_parses() {
        let tok = parse_oauth1_body("oauth_token=t1&oauth_token_secret=s1&mfa_token=m1\n").unwrap();
        assert_eq!(tok.oauth_token, "t1");
        assert_eq!(tok.oauth_token_secret, "s1");
        assert_eq!(tok.mfa_token.as_deref(), Some("m1"));
    }

    #[test]
    fn oauth1_body_missing_secret_errors() {
        assert!(parse_oauth1_body("oauth_token=t1").is_err());
    }
}
