//! Input sanitization, validation and client-side rate limiting.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::content::{
    is_phone_number, starts_with_ignore_case, with_default_scheme, ContentType, EMAIL_RE,
};
use crate::error::{Error, Result};
use crate::format::{format_geo, parse_geo, parse_wifi};
use crate::optimize::MAX_QR_BYTES;

pub const MAX_URL_LENGTH: usize = 2048;
/// Longest rate-limit window a rule may ask for (one year).
pub const MAX_WINDOW_SECS: u64 = 366 * 24 * 60 * 60;

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());
static EVENT_HANDLER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bon[a-z]{3,}\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#,
    )
    .unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)</?[a-zA-Z][^>]*>").unwrap());
static HEX_COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap());

const BLOCKED_SCHEMES: [&str; 4] = ["javascript:", "data:", "vbscript:", "file:"];

/// Why a piece of input was rejected. The message is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter some content")]
    Empty,

    #[error("Content is too long ({actual} bytes, maximum {max})")]
    TooLong { max: usize, actual: usize },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Blocked unsafe URL: {0}")]
    UnsafeUrl(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Invalid color {0}; use #RGB or #RRGGBB")]
    InvalidColor(String),

    #[error("Invalid WiFi settings: {0}")]
    Wifi(String),

    #[error("Invalid contact: {0}")]
    Contact(String),

    #[error("Invalid location: {0}")]
    Geo(String),
}

/// Strips markup and control characters from user input.
///
/// `<script>` blocks, HTML tags and inline event handlers are removed repeatedly until the
/// text stops changing, so the result is stable under a second pass.
pub fn sanitize_input(input: &str) -> String {
    let mut current: String = input
        .replace("\r\n", "\n")
        .chars()
        .map(|c| if c == '\r' { '\n' } else { c })
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();
    loop {
        let without_scripts = SCRIPT_RE.replace_all(&current, "");
        let without_handlers = EVENT_HANDLER_RE.replace_all(&without_scripts, "");
        let next = TAG_RE.replace_all(&without_handlers, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Parses and vets a URL for encoding.
///
/// Only `http` and `https` are accepted; bare domains get `https://`. Embedded credentials,
/// local hosts and private IP ranges are refused.
pub fn validate_url(input: &str) -> std::result::Result<Url, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    if trimmed.len() > MAX_URL_LENGTH {
        return Err(ValidationError::TooLong {
            max: MAX_URL_LENGTH,
            actual: trimmed.len(),
        });
    }
    if let Some(scheme) = BLOCKED_SCHEMES
        .iter()
        .find(|scheme| starts_with_ignore_case(trimmed, scheme))
    {
        return Err(ValidationError::UnsafeUrl(format!("{scheme} links are not allowed")));
    }

    let url = Url::parse(&with_default_scheme(trimmed))
        .map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::UnsafeUrl(format!(
            "{} links are not allowed",
            url.scheme()
        )));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(ValidationError::UnsafeUrl(
            "links with embedded credentials are not allowed".into(),
        ));
    }
    match url.host() {
        None => return Err(ValidationError::InvalidUrl("missing host".into())),
        Some(Host::Domain(domain)) => {
            if domain.eq_ignore_ascii_case("localhost") || !domain.contains('.') {
                return Err(ValidationError::InvalidUrl(format!("{domain} is not a public host")));
            }
        }
        Some(Host::Ipv4(ip)) => check_public_ip(IpAddr::V4(ip))?,
        Some(Host::Ipv6(ip)) => check_public_ip(IpAddr::V6(ip))?,
    }
    Ok(url)
}

fn check_public_ip(ip: IpAddr) -> std::result::Result<(), ValidationError> {
    let private = match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    };
    if private {
        Err(ValidationError::UnsafeUrl(format!("{ip} is a private address")))
    } else {
        Ok(())
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10, carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 0x40)
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}

pub fn validate_email(input: &str) -> std::result::Result<(), ValidationError> {
    let trimmed = input.trim();
    let addr = if starts_with_ignore_case(trimmed, "mailto:") {
        &trimmed[7..]
    } else {
        trimmed
    };
    let addr = addr.split('?').next().unwrap_or(addr);
    if EMAIL_RE.is_match(addr) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(addr.to_string()))
    }
}

pub fn validate_phone(input: &str) -> std::result::Result<(), ValidationError> {
    let trimmed = input.trim();
    let number = if starts_with_ignore_case(trimmed, "tel:") {
        &trimmed[4..]
    } else {
        trimmed
    };
    if is_phone_number(number) {
        Ok(())
    } else {
        Err(ValidationError::InvalidPhone(number.to_string()))
    }
}

pub fn validate_hex_color(input: &str) -> std::result::Result<(), ValidationError> {
    if HEX_COLOR_RE.is_match(input.trim()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidColor(input.to_string()))
    }
}

/// Checks size limits and the type-specific shape of `input`.
pub fn validate_content(
    input: &str,
    content_type: ContentType,
) -> std::result::Result<(), ValidationError> {
    if input.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    if input.len() > MAX_QR_BYTES {
        return Err(ValidationError::TooLong {
            max: MAX_QR_BYTES,
            actual: input.len(),
        });
    }
    if let Some(scheme) = BLOCKED_SCHEMES
        .iter()
        .find(|scheme| starts_with_ignore_case(input.trim(), scheme))
    {
        return Err(ValidationError::UnsafeUrl(format!("{scheme} links are not allowed")));
    }
    match content_type {
        ContentType::Url => validate_url(input).map(|_| ()),
        ContentType::Email => validate_email(input),
        ContentType::Phone => validate_phone(input),
        ContentType::Wifi => parse_wifi(input)?.validate(),
        ContentType::Geo => {
            let (lat, lng) = parse_geo(input)
                .ok_or_else(|| ValidationError::Geo("expected latitude,longitude".into()))?;
            format_geo(lat, lng).map(|_| ())
        }
        ContentType::Vcard => {
            let upper = input.to_ascii_uppercase();
            if upper.starts_with("BEGIN:VCARD") && !upper.contains("END:VCARD") {
                Err(ValidationError::Contact("vCard is missing END:VCARD".into()))
            } else {
                Ok(())
            }
        }
        ContentType::Text => Ok(()),
    }
}

/// Request budget for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(max_requests: usize, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// The window as a chrono delta, saturating at `TimeDelta::MAX`.
    fn window_delta(&self) -> TimeDelta {
        i64::try_from(self.window_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

/// Built-in budgets: feature name and rule.
pub fn default_rules() -> HashMap<String, RateLimitRule> {
    [
        ("generate", RateLimitRule::new(60, 60)),
        ("batch", RateLimitRule::new(5, 600)),
        ("ai_art", RateLimitRule::new(5, 3600)),
        ("assistant", RateLimitRule::new(30, 60)),
    ]
    .into_iter()
    .map(|(name, rule)| (name.to_string(), rule))
    .collect()
}

/// Sliding-window request counter keyed by feature name.
///
/// Each accepted request records its timestamp; timestamps older than the rule's window are
/// pruned on every check. Features without a rule are never limited.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    rules: HashMap<String, RateLimitRule>,
    entries: HashMap<String, Vec<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(rules: HashMap<String, RateLimitRule>) -> Self {
        Self {
            rules,
            entries: HashMap::new(),
        }
    }

    /// Restores previously persisted timestamps.
    pub fn with_state(mut self, entries: HashMap<String, Vec<DateTime<Utc>>>) -> Self {
        self.entries = entries;
        self
    }

    pub fn state(&self) -> &HashMap<String, Vec<DateTime<Utc>>> {
        &self.entries
    }

    pub fn rule(&self, feature: &str) -> Option<RateLimitRule> {
        self.rules.get(feature).copied()
    }

    /// Records a request for `feature` at `now`, or rejects it when the window is full.
    pub fn check(&mut self, feature: &str, now: DateTime<Utc>) -> Result<()> {
        let Some(rule) = self.rule(feature) else {
            return Ok(());
        };
        let entries = self.entries.entry(feature.to_string()).or_default();
        prune(entries, now, rule);

        if entries.len() >= rule.max_requests {
            let oldest = entries.iter().min().copied().unwrap_or(now);
            let retry_after = match oldest.checked_add_signed(rule.window_delta()) {
                Some(end) => (end - now).to_std().unwrap_or(Duration::ZERO),
                None => rule.window(),
            };
            warn!(feature, limit = rule.max_requests, "rate limit exceeded");
            return Err(Error::RateLimited {
                feature: feature.to_string(),
                retry_after,
            });
        }

        entries.push(now);
        debug!(feature, used = entries.len(), limit = rule.max_requests, "request allowed");
        Ok(())
    }

    /// Requests still available for `feature` in the current window.
    pub fn remaining(&mut self, feature: &str, now: DateTime<Utc>) -> Option<usize> {
        let rule = self.rule(feature)?;
        let entries = self.entries.entry(feature.to_string()).or_default();
        prune(entries, now, rule);
        Some(rule.max_requests.saturating_sub(entries.len()))
    }

    pub fn reset(&mut self, feature: &str) {
        self.entries.remove(feature);
    }

    /// Drops features whose windows have fully expired.
    pub fn prune_empty(&mut self, now: DateTime<Utc>) {
        let rules = &self.rules;
        self.entries.retain(|feature, entries| {
            if let Some(rule) = rules.get(feature) {
                prune(entries, now, *rule);
            }
            !entries.is_empty()
        });
    }
}

fn prune(entries: &mut Vec<DateTime<Utc>>, now: DateTime<Utc>, rule: RateLimitRule) {
    // A window reaching past the start of representable time keeps everything.
    let Some(cutoff) = now.checked_sub_signed(rule.window_delta()) else {
        return;
    };
    entries.retain(|t| *t > cutoff);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: usize, window_secs: u64) -> RateLimiter {
        let mut rules = HashMap::new();
        rules.insert("generate".to_string(), RateLimitRule::new(max, window_secs));
        RateLimiter::new(rules)
    }

    #[test]
    fn test_sanitize_strips_markup() {
        assert_eq!(
            sanitize_input("Hi <script>alert('x')</script><b onclick=\"steal()\">there</b>"),
            "Hi there"
        );
        assert_eq!(sanitize_input("tab\tand\nnewline\u{0007}"), "tab\tand\nnewline");
        assert_eq!(sanitize_input("5 < 6 and only = 3"), "5 < 6 and only = 3");
    }

    #[test]
    fn test_sanitize_strips_any_event_handler() {
        assert_eq!(sanitize_input("tap onpointerdown=\"go()\" here"), "tap  here");
        assert_eq!(sanitize_input("x onAnimationStart='y()' z"), "x  z");
    }

    #[test]
    fn test_sanitize_normalizes_carriage_returns() {
        assert_eq!(sanitize_input("one\r\ntwo\rthree"), "one\ntwo\nthree");
        assert!(!sanitize_input("a\r\r\nb").contains('\r'));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for s in ["<<b>a>", "<scr<script></script>ipt>alert(1)</script>", "plain"] {
            let once = sanitize_input(s);
            assert_eq!(sanitize_input(&once), once, "{s}");
        }
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/path").is_ok());
        assert_eq!(validate_url("example.com").unwrap().as_str(), "https://example.com/");
        assert!(matches!(
            validate_url("javascript:alert(1)"),
            Err(ValidationError::UnsafeUrl(_))
        ));
        assert!(matches!(
            validate_url("DATA:text/html,hi"),
            Err(ValidationError::UnsafeUrl(_))
        ));
        assert!(matches!(validate_url("ftp://example.com"), Err(ValidationError::UnsafeUrl(_))));
        assert!(validate_url("https://user:pw@example.com").is_err());
        assert!(validate_url("http://localhost:3000").is_err());
        assert!(validate_url("http://192.168.1.1/admin").is_err());
        assert!(validate_url("http://8.8.8.8").is_ok());
        for host in [
            "http://[fd00::1]/",
            "http://[fe80::1]/",
            "http://[::ffff:192.168.1.1]/",
            "http://100.64.0.1/",
            "http://[::1]/",
        ] {
            assert!(
                matches!(validate_url(host), Err(ValidationError::UnsafeUrl(_))),
                "{host}"
            );
        }
        assert!(validate_url("http://100.128.0.1/").is_ok());
        assert!(validate_url("http://[2606:4700::1111]/").is_ok());
        assert_eq!(
            validate_url("example.com/login?next=https://example.com/home")
                .unwrap()
                .host_str(),
            Some("example.com")
        );
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(matches!(validate_url(&long), Err(ValidationError::TooLong { .. })));
    }

    #[test]
    fn test_validate_small_fields() {
        assert!(validate_email("mailto:ada@example.org?subject=x").is_ok());
        assert!(validate_email("ada@").is_err());
        assert!(validate_phone("tel:+1 555 123 4567").is_ok());
        assert!(validate_phone("12").is_err());
        assert!(validate_hex_color("#fff").is_ok());
        assert!(validate_hex_color("#A1B2C3").is_ok());
        assert!(validate_hex_color("red").is_err());
    }

    #[test]
    fn test_validate_content() {
        assert_eq!(validate_content("  ", ContentType::Text), Err(ValidationError::Empty));
        let huge = "x".repeat(MAX_QR_BYTES + 1);
        assert!(matches!(
            validate_content(&huge, ContentType::Text),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(validate_content("WIFI:T:WPA;S:Net;P:short;;", ContentType::Wifi).is_err());
        assert!(validate_content("WIFI:T:WPA;S:Net;P:longenough;;", ContentType::Wifi).is_ok());
        assert!(validate_content("geo:95,0", ContentType::Geo).is_err());
        assert!(validate_content("BEGIN:VCARD\nFN:Ada", ContentType::Vcard).is_err());
        assert!(matches!(
            validate_content("JavaScript:alert(1)", ContentType::Text),
            Err(ValidationError::UnsafeUrl(_))
        ));
    }

    #[test]
    fn test_rate_limit_allows_exactly_at_limit() {
        let mut rl = limiter(3, 60);
        let now = Utc::now();
        for _ in 0..3 {
            assert!(rl.check("generate", now).is_ok());
        }
        assert_eq!(rl.remaining("generate", now), Some(0));
    }

    #[test]
    fn test_rate_limit_rejects_over_limit() {
        let mut rl = limiter(3, 60);
        let now = Utc::now();
        for _ in 0..3 {
            rl.check("generate", now).unwrap();
        }
        match rl.check("generate", now) {
            Err(Error::RateLimited {
                feature,
                retry_after,
            }) => {
                assert_eq!(feature, "generate");
                assert_eq!(retry_after, Duration::from_secs(60));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
        // Rejected requests are not recorded
        assert_eq!(rl.state()["generate"].len(), 3);
    }

    #[test]
    fn test_rate_limit_window_slides() {
        let mut rl = limiter(2, 60);
        let start = Utc::now();
        rl.check("generate", start).unwrap();
        rl.check("generate", start + chrono::Duration::seconds(30)).unwrap();
        assert!(rl.check("generate", start + chrono::Duration::seconds(59)).is_err());
        // First entry has expired
        assert!(rl.check("generate", start + chrono::Duration::seconds(61)).is_ok());
    }

    #[test]
    fn test_rate_limit_huge_window_saturates() {
        let mut rl = limiter(1, u64::MAX);
        let now = Utc::now();
        rl.check("generate", now).unwrap();
        match rl.check("generate", now) {
            Err(Error::RateLimited { retry_after, .. }) => {
                assert_eq!(retry_after, Duration::from_secs(u64::MAX));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
        rl.prune_empty(now);
        assert_eq!(rl.state()["generate"].len(), 1);
    }

    #[test]
    fn test_unknown_feature_is_unlimited() {
        let mut rl = limiter(1, 60);
        let now = Utc::now();
        for _ in 0..10 {
            assert!(rl.check("export", now).is_ok());
        }
        assert_eq!(rl.remaining("export", now), None);
    }

    #[test]
    fn test_reset_and_prune() {
        let mut rl = limiter(1, 60);
        let now = Utc::now();
        rl.check("generate", now).unwrap();
        rl.reset("generate");
        assert!(rl.check("generate", now).is_ok());
        rl.prune_empty(now + chrono::Duration::seconds(120));
        assert!(rl.state().is_empty());
    }
}
