//! Content-type detection.
//!
//! Free-form input is classified with a fixed chain of pattern checks. The first match wins,
//! so the order below is significant: anything starting with `http://` or `https://` is a
//! URL no matter what follows.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static URL_SCHEME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^https?://").unwrap());
static ANY_SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").unwrap());
static WWW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^www\.\S+\.\S+$").unwrap());
static BARE_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)*\.[a-z]{2,24}(?::\d{1,5})?(?:[/?#]\S*)?$",
    )
    .unwrap()
});
static GEO_URI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^geo:-?\d{1,3}(?:\.\d+)?,-?\d{1,3}(?:\.\d+)?").unwrap());
static LAT_LNG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-?\d{1,2}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)$").unwrap());
pub(crate) static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?[\d\s().-]{7,20}$").unwrap());

/// The kind of payload a piece of input represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Url,
    Email,
    Phone,
    Wifi,
    Vcard,
    Geo,
    Text,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        ContentType::Url,
        ContentType::Email,
        ContentType::Phone,
        ContentType::Wifi,
        ContentType::Vcard,
        ContentType::Geo,
        ContentType::Text,
    ];

    /// Stable lowercase key, used in analytics and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Url => "url",
            ContentType::Email => "email",
            ContentType::Phone => "phone",
            ContentType::Wifi => "wifi",
            ContentType::Vcard => "vcard",
            ContentType::Geo => "geo",
            ContentType::Text => "text",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ContentType::Url => "Website",
            ContentType::Email => "Email",
            ContentType::Phone => "Phone number",
            ContentType::Wifi => "WiFi network",
            ContentType::Vcard => "Contact card",
            ContentType::Geo => "Location",
            ContentType::Text => "Plain text",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown content type: {s}"))
    }
}

/// Classifies `input` into one of the [`ContentType`] categories.
///
/// # Example
///
/// ```rust
/// use qrsmith::content::{detect_content_type, ContentType};
///
/// assert_eq!(detect_content_type("https://example.com"), ContentType::Url);
/// assert_eq!(detect_content_type("WIFI:T:WPA;S:home;P:secret123;;"), ContentType::Wifi);
/// assert_eq!(detect_content_type("hello there"), ContentType::Text);
/// ```
pub fn detect_content_type(input: &str) -> ContentType {
    let text = input.trim();
    if text.is_empty() {
        return ContentType::Text;
    }

    if URL_SCHEME_RE.is_match(text) {
        return ContentType::Url;
    }
    if starts_with_ignore_case(text, "WIFI:") {
        return ContentType::Wifi;
    }
    if starts_with_ignore_case(text, "BEGIN:VCARD") || starts_with_ignore_case(text, "MECARD:") {
        return ContentType::Vcard;
    }
    if GEO_URI_RE.is_match(text) || is_lat_lng_pair(text) {
        return ContentType::Geo;
    }
    if WWW_RE.is_match(text) || BARE_DOMAIN_RE.is_match(text) {
        return ContentType::Url;
    }
    if starts_with_ignore_case(text, "mailto:") || EMAIL_RE.is_match(text) {
        return ContentType::Email;
    }
    if starts_with_ignore_case(text, "tel:") || is_phone_number(text) {
        return ContentType::Phone;
    }
    ContentType::Text
}

/// Returns `true` for phone-shaped strings carrying 7 to 15 digits.
pub fn is_phone_number(text: &str) -> bool {
    if !PHONE_RE.is_match(text) {
        return false;
    }
    let digits = text.chars().filter(char::is_ascii_digit).count();
    (7..=15).contains(&digits)
}

fn is_lat_lng_pair(text: &str) -> bool {
    let Some(caps) = LAT_LNG_RE.captures(text) else {
        return false;
    };
    let lat: f64 = caps[1].parse().unwrap_or(f64::NAN);
    let lng: f64 = caps[2].parse().unwrap_or(f64::NAN);
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

/// True when `text` opens with `scheme://`. A `://` later in the text (say, inside a
/// redirect parameter) does not count.
pub(crate) fn has_scheme(text: &str) -> bool {
    ANY_SCHEME_RE.is_match(text)
}

/// Prefixes `https://` unless the text already names a scheme.
pub(crate) fn with_default_scheme(text: &str) -> String {
    let text = text.trim();
    if has_scheme(text) {
        text.to_string()
    } else {
        format!("https://{text}")
    }
}

pub(crate) fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_prefix_is_always_url() {
        for input in [
            "http://example.com",
            "https://example.com/path?q=1",
            "HTTPS://EXAMPLE.COM",
            "https://",
            "https://user@mail.com",
            "http://WIFI:T:WPA;S:x;;",
        ] {
            assert_eq!(detect_content_type(input), ContentType::Url, "{input}");
        }
    }

    #[test]
    fn test_bare_domains_are_urls() {
        assert_eq!(detect_content_type("www.rust-lang.org"), ContentType::Url);
        assert_eq!(detect_content_type("docs.rs/qrcode"), ContentType::Url);
        assert_eq!(detect_content_type("example.com:8080/x"), ContentType::Url);
    }

    #[test]
    fn test_structured_payloads() {
        assert_eq!(detect_content_type("WIFI:T:WPA;S:Cafe;P:latte123;;"), ContentType::Wifi);
        assert_eq!(
            detect_content_type("BEGIN:VCARD\nVERSION:3.0\nFN:Ada\nEND:VCARD"),
            ContentType::Vcard
        );
        assert_eq!(detect_content_type("MECARD:N:Ada;;"), ContentType::Vcard);
    }

    #[test]
    fn test_geo() {
        assert_eq!(detect_content_type("geo:37.7749,-122.4194"), ContentType::Geo);
        assert_eq!(detect_content_type("37.7749, -122.4194"), ContentType::Geo);
        // Out of range latitude
        assert_eq!(detect_content_type("97.5, 10.0"), ContentType::Text);
    }

    #[test]
    fn test_email_and_phone() {
        assert_eq!(detect_content_type("ada@example.org"), ContentType::Email);
        assert_eq!(detect_content_type("mailto:ada@example.org?subject=Hi"), ContentType::Email);
        assert_eq!(detect_content_type("+1 (555) 123-4567"), ContentType::Phone);
        assert_eq!(detect_content_type("tel:5551234"), ContentType::Phone);
        assert_eq!(detect_content_type("12345"), ContentType::Text);
    }

    #[test]
    fn test_text_fallback() {
        assert_eq!(detect_content_type(""), ContentType::Text);
        assert_eq!(detect_content_type("   "), ContentType::Text);
        assert_eq!(detect_content_type("Meet me at the station"), ContentType::Text);
    }

    #[test]
    fn test_from_str_round_trips_keys() {
        assert_eq!("WIFI".parse::<ContentType>().unwrap(), ContentType::Wifi);
        assert!("barcode".parse::<ContentType>().is_err());
    }
}
