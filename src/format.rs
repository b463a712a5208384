//! Payload templates for structured QR content.
//!
//! These builders produce the strings scanners understand: `WIFI:` network configs, vCard
//! 3.0 contacts, `geo:` locations, `mailto:`, `SMSTO:` and `tel:` URIs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::content::{is_phone_number, starts_with_ignore_case, EMAIL_RE};
use crate::security::ValidationError;

const MAX_SSID_BYTES: usize = 32;

/// Authentication type of a WiFi network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WifiSecurity {
    #[default]
    #[serde(rename = "WPA", alias = "WPA2", alias = "WPA3")]
    Wpa,
    #[serde(rename = "WEP")]
    Wep,
    #[serde(rename = "nopass")]
    Nopass,
}

impl WifiSecurity {
    pub fn as_str(self) -> &'static str {
        match self {
            WifiSecurity::Wpa => "WPA",
            WifiSecurity::Wep => "WEP",
            WifiSecurity::Nopass => "nopass",
        }
    }
}

impl fmt::Display for WifiSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WifiSecurity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WPA" | "WPA2" | "WPA3" | "WPA/WPA2" | "SAE" => Ok(WifiSecurity::Wpa),
            "WEP" => Ok(WifiSecurity::Wep),
            "NOPASS" | "NONE" | "OPEN" | "" => Ok(WifiSecurity::Nopass),
            other => Err(ValidationError::Wifi(format!("unknown security type {other}"))),
        }
    }
}

/// A WiFi network to share.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub security: WifiSecurity,
    #[serde(default)]
    pub hidden: bool,
}

impl WifiConfig {
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
        security: WifiSecurity,
    ) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            security,
            hidden: false,
        }
    }

    /// Checks SSID and key length rules for the selected security type.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ssid.trim().is_empty() {
            return Err(ValidationError::Wifi("Network name (SSID) is required".into()));
        }
        if self.ssid.len() > MAX_SSID_BYTES {
            return Err(ValidationError::Wifi(format!(
                "Network name must be at most {MAX_SSID_BYTES} bytes"
            )));
        }
        let key = self.password.as_str();
        match self.security {
            WifiSecurity::Nopass => Ok(()),
            WifiSecurity::Wpa => {
                let len = key.chars().count();
                if (8..=63).contains(&len) {
                    Ok(())
                } else {
                    Err(ValidationError::Wifi(
                        "WPA passwords must be 8 to 63 characters".into(),
                    ))
                }
            }
            WifiSecurity::Wep => {
                let is_hex = key.chars().all(|c| c.is_ascii_hexdigit());
                let ok = matches!(key.len(), 5 | 13) && key.is_ascii()
                    || matches!(key.len(), 10 | 26) && is_hex;
                if ok {
                    Ok(())
                } else {
                    Err(ValidationError::Wifi(
                        "WEP keys must be 5 or 13 characters, or 10 or 26 hex digits".into(),
                    ))
                }
            }
        }
    }
}

/// Builds the `WIFI:` payload understood by phone cameras.
///
/// # Example
///
/// ```rust
/// use qrsmith::format::{format_wifi, WifiConfig, WifiSecurity};
///
/// let wifi = WifiConfig::new("HomeNet", "hunter22", WifiSecurity::Wpa);
/// assert_eq!(format_wifi(&wifi), "WIFI:T:WPA;S:HomeNet;P:hunter22;;");
/// ```
pub fn format_wifi(config: &WifiConfig) -> String {
    let password = match config.security {
        WifiSecurity::Nopass => String::new(),
        _ => escape_wifi_field(&config.password),
    };
    let hidden = if config.hidden { "H:true;" } else { "" };
    format!(
        "WIFI:T:{};S:{};P:{};{};",
        config.security,
        escape_wifi_field(&config.ssid),
        password,
        hidden
    )
}

/// Parses a `WIFI:` payload back into a [`WifiConfig`].
pub fn parse_wifi(payload: &str) -> Result<WifiConfig, ValidationError> {
    let payload = payload.trim();
    if !starts_with_ignore_case(payload, "WIFI:") {
        return Err(ValidationError::Wifi("payload does not start with WIFI:".into()));
    }

    let mut config = WifiConfig::default();
    let mut security = None;
    for field in split_unescaped(&payload[5..], ';') {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        let value = unescape_wifi_field(value);
        match key.to_ascii_uppercase().as_str() {
            "T" => security = Some(value.parse()?),
            "S" => config.ssid = value,
            "P" => config.password = value,
            "H" => config.hidden = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }
    config.security = match security {
        Some(s) => s,
        None if config.password.is_empty() => WifiSecurity::Nopass,
        None => WifiSecurity::Wpa,
    };
    if config.ssid.is_empty() {
        return Err(ValidationError::Wifi("payload has no SSID".into()));
    }
    Ok(config)
}

fn escape_wifi_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ';' | ',' | ':' | '"') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape_wifi_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn split_unescaped(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&input[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Contact details for a vCard payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactCard {
    pub first_name: String,
    pub last_name: String,
    pub organization: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub note: Option<String>,
}

impl ContactCard {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.full_name().is_empty() {
            return Err(ValidationError::Contact("A first or last name is required".into()));
        }
        if let Some(email) = non_empty(&self.email) {
            if !EMAIL_RE.is_match(email) {
                return Err(ValidationError::Contact(format!("{email} is not a valid email")));
            }
        }
        if let Some(phone) = non_empty(&self.phone) {
            if !is_phone_number(phone) {
                return Err(ValidationError::Contact(format!(
                    "{phone} is not a valid phone number"
                )));
            }
        }
        Ok(())
    }
}

/// Renders a vCard 3.0 block with CRLF line endings.
pub fn format_vcard(card: &ContactCard) -> String {
    let mut lines = vec![
        "BEGIN:VCARD".to_string(),
        "VERSION:3.0".to_string(),
        format!(
            "N:{};{};;;",
            escape_vcard(card.last_name.trim()),
            escape_vcard(card.first_name.trim())
        ),
        format!("FN:{}", escape_vcard(&card.full_name())),
    ];
    let optional = [
        ("ORG", &card.organization),
        ("TITLE", &card.title),
        ("TEL;TYPE=CELL", &card.phone),
        ("EMAIL", &card.email),
        ("URL", &card.website),
    ];
    for (key, value) in optional {
        if let Some(value) = non_empty(value) {
            lines.push(format!("{key}:{}", escape_vcard(value)));
        }
    }
    if let Some(address) = non_empty(&card.address) {
        lines.push(format!("ADR;TYPE=WORK:;;{};;;;", escape_vcard(address)));
    }
    if let Some(note) = non_empty(&card.note) {
        lines.push(format!("NOTE:{}", escape_vcard(note)));
    }
    lines.push("END:VCARD".to_string());
    lines.join("\r\n")
}

fn escape_vcard(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Builds a `geo:` URI, trimming redundant trailing zeros.
pub fn format_geo(lat: f64, lng: f64) -> Result<String, ValidationError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ValidationError::Geo(format!("latitude {lat} is out of range")));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(ValidationError::Geo(format!("longitude {lng} is out of range")));
    }
    Ok(format!("geo:{},{}", trim_coordinate(lat), trim_coordinate(lng)))
}

fn trim_coordinate(value: f64) -> String {
    let s = format!("{value:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Reads a `geo:lat,lng` URI or a bare `lat, lng` pair.
pub fn parse_geo(input: &str) -> Option<(f64, f64)> {
    let text = input.trim();
    let body = if starts_with_ignore_case(text, "geo:") {
        &text[4..]
    } else {
        text
    };
    // Drop `;u=` uncertainty and `?q=` query parameters.
    let body = body.split([';', '?']).next().unwrap_or(body);
    let (lat, lng) = body.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().split(',').next()?.trim().parse().ok()?;
    Some((lat, lng))
}

/// Builds a `mailto:` URI with optional subject and body.
pub fn format_email(to: &str, subject: Option<&str>, body: Option<&str>) -> String {
    let mut params = Vec::new();
    if let Some(subject) = subject.filter(|s| !s.is_empty()) {
        params.push(format!("subject={}", urlencoding::encode(subject)));
    }
    if let Some(body) = body.filter(|s| !s.is_empty()) {
        params.push(format!("body={}", urlencoding::encode(body)));
    }
    if params.is_empty() {
        format!("mailto:{}", to.trim())
    } else {
        format!("mailto:{}?{}", to.trim(), params.join("&"))
    }
}

pub fn format_sms(number: &str, message: &str) -> String {
    format!("SMSTO:{}:{}", number.trim(), message)
}

pub fn format_phone(number: &str) -> String {
    crate::optimize::optimize_phone(number)
}
