//! Open and click tracking injection.
//!
//! [`inject_tracking`] rewrites anchor targets through a click-redirect
//! endpoint and appends a 1×1 open beacon. Opt-out links (`unsubscribe`) and
//! native-app schemes (`mailto:`, `tel:`) pass through untouched, as do
//! in-page fragments (`#`). Malformed markup never causes an error; when the
//! body has no closing `</body>` the beacon is appended to the end.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;

use crate::token::TrackingToken;

/// Matches `href` attributes with either quoting style. The regex crate has
/// no backreferences, so the two styles are separate alternatives.
#[allow(clippy::expect_used, reason = "the pattern is a literal")]
static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("href pattern compiles")
});

/// Where the tracking endpoints live.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Origin prepended to the tracking paths; empty means relative URLs.
    #[serde(default)]
    pub base_url: String,

    #[serde(default = "default_click_path")]
    pub click_path: String,

    #[serde(default = "default_open_path")]
    pub open_path: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            click_path: default_click_path(),
            open_path: default_open_path(),
        }
    }
}

fn default_click_path() -> String {
    "/track/click".to_string()
}

fn default_open_path() -> String {
    "/track/open".to_string()
}

/// Stamp a message body with open and click tracking for one recipient.
///
/// Pure: identical inputs produce identical output. The token is built by the
/// caller so the send timestamp is pinned once per attempt.
#[must_use]
pub fn inject_tracking(body: &str, token: &TrackingToken, config: &TrackingConfig) -> String {
    let encoded = token.encode();
    let rewritten = rewrite_links(body, &encoded, config);
    append_beacon(&rewritten, &encoded, config)
}

/// A link target the injector must leave alone.
fn is_exempt(url: &str) -> bool {
    url.starts_with("mailto:")
        || url.starts_with("tel:")
        || url.starts_with('#')
        || url.contains("unsubscribe")
}

fn rewrite_links(body: &str, token: &str, config: &TrackingConfig) -> String {
    HREF.replace_all(body, |caps: &Captures<'_>| {
        let (url, quote) = match (caps.get(1), caps.get(2)) {
            (Some(m), _) => (m.as_str(), '"'),
            (_, Some(m)) => (m.as_str(), '\''),
            _ => return caps[0].to_string(),
        };

        if is_exempt(url) {
            return caps[0].to_string();
        }

        format!(
            "href={quote}{base}{path}?token={token}&url={original}{quote}",
            base = config.base_url,
            path = config.click_path,
            original = urlencoding::encode(url),
        )
    })
    .into_owned()
}

fn append_beacon(body: &str, token: &str, config: &TrackingConfig) -> String {
    let beacon = format!(
        r#"<img src="{base}{path}?token={token}" width="1" height="1" style="display:none" alt=""/>"#,
        base = config.base_url,
        path = config.open_path,
    );

    // ASCII lowercasing preserves byte offsets, so the index found in the
    // lowered copy is valid in the original.
    match body.to_ascii_lowercase().rfind("</body>") {
        Some(idx) => {
            let mut out = String::with_capacity(body.len() + beacon.len());
            out.push_str(&body[..idx]);
            out.push_str(&beacon);
            out.push_str(&body[idx..]);
            out
        }
        None => {
            let mut out = String::with_capacity(body.len() + beacon.len());
            out.push_str(body);
            out.push_str(&beacon);
            out
        }
    }
}
