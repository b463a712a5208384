//! Content normalization and error-correction selection.
//!
//! Every optimizer here is idempotent: feeding its output back in returns the same string.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::content::{
    detect_content_type, starts_with_ignore_case, with_default_scheme, ContentType,
};
use crate::format::{format_geo, parse_geo};

/// Largest payload a QR code can carry in byte mode (version 40, level L).
pub const MAX_QR_BYTES: usize = 2953;

const LONG_CONTENT_BYTES: usize = 300;
const VERY_LONG_CONTENT_BYTES: usize = 1000;

static INLINE_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

const TRACKING_PARAMS: [&str; 4] = ["fbclid", "gclid", "mc_cid", "mc_eid"];

/// QR error correction level.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum EccLevel {
    /// Tolerates ~7% erroneous codewords.
    L,
    /// Tolerates ~15% erroneous codewords.
    #[default]
    M,
    /// Tolerates ~25% erroneous codewords.
    Q,
    /// Tolerates ~30% erroneous codewords.
    H,
}

impl EccLevel {
    /// One level less redundant, saturating at `L`.
    pub fn lower(self) -> Self {
        match self {
            EccLevel::H => EccLevel::Q,
            EccLevel::Q => EccLevel::M,
            EccLevel::M | EccLevel::L => EccLevel::L,
        }
    }

    pub fn to_qrcode(self) -> qrcode::EcLevel {
        match self {
            EccLevel::L => qrcode::EcLevel::L,
            EccLevel::M => qrcode::EcLevel::M,
            EccLevel::Q => qrcode::EcLevel::Q,
            EccLevel::H => qrcode::EcLevel::H,
        }
    }
}

impl fmt::Display for EccLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EccLevel::L => "L",
            EccLevel::M => "M",
            EccLevel::Q => "Q",
            EccLevel::H => "H",
        };
        f.write_str(s)
    }
}

impl FromStr for EccLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(EccLevel::L),
            "m" | "medium" => Ok(EccLevel::M),
            "q" | "quartile" => Ok(EccLevel::Q),
            "h" | "high" => Ok(EccLevel::H),
            other => Err(format!("unknown error correction level: {other}")),
        }
    }
}

/// Result of running input through [`optimize_for_qr`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Optimization {
    pub content: String,
    pub content_type: ContentType,
    pub ecc: EccLevel,
    pub original_length: usize,
    pub optimized_length: usize,
    pub suggestions: Vec<String>,
}

impl Optimization {
    pub fn bytes_saved(&self) -> usize {
        self.original_length.saturating_sub(self.optimized_length)
    }
}

/// Normalizes whitespace and typography in free text.
///
/// Line endings become `\n`, zero-width characters are dropped, typographic quotes and
/// dashes become ASCII, runs of spaces collapse, lines are trimmed, and at most one blank
/// line is kept between paragraphs.
pub fn optimize_text(input: &str) -> String {
    let mut text = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                text.push('\n');
            }
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' => {}
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => text.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => text.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => text.push('-'),
            '\u{2026}' => text.push_str("..."),
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => text.push(' '),
            other => text.push(other),
        }
    }

    let lines: Vec<String> = text
        .split('\n')
        .map(|line| INLINE_SPACE_RE.replace_all(line, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");
    BLANK_LINES_RE
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

/// Canonicalizes a URL: adds `https://` to bare domains, lowercases scheme and host, and
/// drops tracking parameters plus empty query/fragment markers.
pub fn optimize_url(input: &str) -> String {
    canonicalize_url(input).0
}

/// Canonical form of `input` plus whether a tracking parameter was dropped from it.
fn canonicalize_url(input: &str) -> (String, bool) {
    let Ok(mut url) = Url::parse(&with_default_scheme(input)) else {
        return (optimize_text(input), false);
    };

    let mut tracking_removed = false;
    if url.query().is_some() {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let kept: Vec<&(String, String)> =
            pairs.iter().filter(|(k, _)| !is_tracking_param(k)).collect();
        tracking_removed = kept.len() != pairs.len();
        if kept.is_empty() {
            url.set_query(None);
        } else if kept.len() != pairs.len() {
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
    }
    if url.fragment() == Some("") {
        url.set_fragment(None);
    }
    (url.to_string(), tracking_removed)
}

/// Produces a `tel:` URI holding only the leading `+` and digits.
pub fn optimize_phone(input: &str) -> String {
    let trimmed = input.trim();
    let number = if starts_with_ignore_case(trimmed, "tel:") {
        &trimmed[4..]
    } else {
        trimmed
    };
    let mut out = String::from("tel:");
    for (i, c) in number.trim().chars().enumerate() {
        if c.is_ascii_digit() || (c == '+' && i == 0) {
            out.push(c);
        }
    }
    out
}

/// Produces a `mailto:` URI with a lowercased address; any query is preserved.
pub fn optimize_email(input: &str) -> String {
    let trimmed = input.trim();
    let rest = if starts_with_ignore_case(trimmed, "mailto:") {
        &trimmed[7..]
    } else {
        trimmed
    };
    match rest.split_once('?') {
        Some((addr, query)) if !query.is_empty() => {
            format!("mailto:{}?{}", addr.trim().to_lowercase(), query)
        }
        Some((addr, _)) => format!("mailto:{}", addr.trim().to_lowercase()),
        None => format!("mailto:{}", rest.to_lowercase()),
    }
}

fn optimize_geo(input: &str) -> String {
    match parse_geo(input) {
        Some((lat, lng)) => format_geo(lat, lng).unwrap_or_else(|_| input.trim().to_string()),
        None => input.trim().to_string(),
    }
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Picks an error-correction level for a payload of the given type and size.
///
/// Payloads that get scanned off posters and fridges (WiFi, locations, phone numbers) start
/// at `H`; long payloads trade redundancy for a less dense symbol.
pub fn recommended_ecc(content_type: ContentType, byte_len: usize) -> EccLevel {
    let base = match content_type {
        ContentType::Wifi | ContentType::Geo | ContentType::Phone => EccLevel::H,
        ContentType::Url | ContentType::Email => EccLevel::Q,
        ContentType::Vcard | ContentType::Text => EccLevel::M,
    };
    if byte_len > VERY_LONG_CONTENT_BYTES {
        EccLevel::L
    } else if byte_len > LONG_CONTENT_BYTES {
        base.lower()
    } else {
        base
    }
}

/// Applies the type-specific optimizer for an already classified input.
pub fn optimize_as(input: &str, content_type: ContentType) -> String {
    match content_type {
        ContentType::Url => optimize_url(input),
        ContentType::Email => optimize_email(input),
        ContentType::Phone => optimize_phone(input),
        ContentType::Geo => optimize_geo(input),
        ContentType::Wifi | ContentType::Vcard => input.trim().to_string(),
        ContentType::Text => optimize_text(input),
    }
}

/// Detects, normalizes and picks an error-correction level for `input`.
///
/// # Example
///
/// ```rust
/// use qrsmith::content::ContentType;
/// use qrsmith::optimize::{optimize_for_qr, EccLevel};
///
/// let opt = optimize_for_qr("https://Example.com/?utm_source=mail");
/// assert_eq!(opt.content_type, ContentType::Url);
/// assert_eq!(opt.content, "https://example.com/");
/// assert_eq!(opt.ecc, EccLevel::Q);
/// ```
pub fn optimize_for_qr(input: &str) -> Optimization {
    let content_type = detect_content_type(input);
    let (content, tracking_removed) = match content_type {
        ContentType::Url => canonicalize_url(input),
        _ => (optimize_as(input, content_type), false),
    };
    let optimized_length = content.len();
    let ecc = recommended_ecc(content_type, optimized_length);

    let mut suggestions = Vec::new();
    if optimized_length > MAX_QR_BYTES {
        suggestions.push(format!(
            "Content is {optimized_length} bytes; a QR code holds at most {MAX_QR_BYTES}"
        ));
    }
    match content_type {
        ContentType::Url if optimized_length > LONG_CONTENT_BYTES => {
            suggestions.push("Long URL; a link shortener makes the code easier to scan".into())
        }
        ContentType::Url if content.starts_with("http://") => {
            suggestions.push("Consider using HTTPS for this link".into())
        }
        ContentType::Text if optimized_length > 500 => suggestions.push(
            "Long text produces a dense code; consider hosting it and encoding a link".into(),
        ),
        _ => {}
    }
    if ecc == EccLevel::L && optimized_length > VERY_LONG_CONTENT_BYTES {
        suggestions.push("Error correction lowered to L to keep the code scannable".into());
    }
    if tracking_removed {
        suggestions.push("Tracking parameters were removed".into());
    }

    debug!(
        content_type = %content_type,
        ecc = %ecc,
        original = input.len(),
        optimized = optimized_length,
        "optimized content"
    );

    Optimization {
        content,
        content_type,
        ecc,
        original_length: input.len(),
        optimized_length,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimize_text_normalizes() {
        let input = "  Hello\u{200B}   world\r\n\r\n\r\n\r\n“quoted” — done…  ";
        assert_eq!(optimize_text(input), "Hello world\n\n\"quoted\" - done...");
    }

    #[test]
    fn test_optimize_text_is_idempotent() {
        let samples = [
            "",
            "   ",
            "a\t\tb\r\nc\r\r\r\rd",
            "line one  \n   \n\n\n line two",
            "\u{FEFF}BOM and\u{00A0}nbsp",
            "already clean",
        ];
        for s in samples {
            let once = optimize_text(s);
            assert_eq!(optimize_text(&once), once, "{s:?}");
        }
    }

    #[test]
    fn test_optimize_url_strips_tracking() {
        assert_eq!(
            optimize_url("HTTPS://Shop.Example.com/item?id=7&utm_source=x&fbclid=abc#"),
            "https://shop.example.com/item?id=7"
        );
        assert_eq!(optimize_url("www.example.com"), "https://www.example.com/");
        assert_eq!(optimize_url("https://example.com/?utm_medium=a"), "https://example.com/");
    }

    #[test]
    fn test_optimize_url_is_idempotent() {
        for s in [
            "https://example.com/a b?q=hello world&utm_campaign=z",
            "example.org/path?x=1#frag",
            "http://EXAMPLE.com",
        ] {
            let once = optimize_url(s);
            assert_eq!(optimize_url(&once), once, "{s}");
        }
    }

    #[test]
    fn test_optimize_phone_and_email() {
        assert_eq!(optimize_phone("+1 (555) 123-4567"), "tel:+15551234567");
        assert_eq!(optimize_phone(&optimize_phone("555.123.4567")), "tel:5551234567");
        assert_eq!(optimize_email("Ada@Example.ORG"), "mailto:ada@example.org");
        assert_eq!(
            optimize_email("mailto:Ada@Example.org?subject=Hi"),
            "mailto:ada@example.org?subject=Hi"
        );
    }

    #[test]
    fn test_recommended_ecc() {
        assert_eq!(recommended_ecc(ContentType::Wifi, 40), EccLevel::H);
        assert_eq!(recommended_ecc(ContentType::Url, 40), EccLevel::Q);
        assert_eq!(recommended_ecc(ContentType::Url, 400), EccLevel::M);
        assert_eq!(recommended_ecc(ContentType::Text, 1200), EccLevel::L);
        assert_eq!(recommended_ecc(ContentType::Vcard, 200), EccLevel::M);
    }

    #[test]
    fn test_optimize_for_qr_geo_pair() {
        let opt = optimize_for_qr("40.7128, -74.0060");
        assert_eq!(opt.content_type, ContentType::Geo);
        assert_eq!(opt.content, "geo:40.7128,-74.006");
        assert_eq!(opt.ecc, EccLevel::H);
    }

    #[test]
    fn test_optimize_for_qr_reports_tracking_removal() {
        let opt = optimize_for_qr("https://example.com/?utm_source=newsletter");
        assert!(opt.bytes_saved() > 0);
        assert!(opt.suggestions.iter().any(|s| s.contains("Tracking")));
    }

    #[test]
    fn test_optimize_for_qr_only_flags_real_tracking() {
        let opt = optimize_for_qr("https://example.com:443/#");
        assert_eq!(opt.content, "https://example.com/");
        assert!(opt.bytes_saved() > 0);
        assert!(!opt.suggestions.iter().any(|s| s.contains("Tracking")));
    }

    #[test]
    fn test_optimize_url_bare_domain_with_redirect() {
        assert_eq!(
            optimize_url("example.com/login?next=https://example.com/home"),
            "https://example.com/login?next=https://example.com/home"
        );
    }

    #[test]
    fn test_ecc_parse() {
        assert_eq!("h".parse::<EccLevel>().unwrap(), EccLevel::H);
        assert_eq!("Quartile".parse::<EccLevel>().unwrap(), EccLevel::Q);
        assert!("x".parse::<EccLevel>().is_err());
    }
}
