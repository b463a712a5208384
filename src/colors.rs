//! Brand palettes and WCAG contrast checks for QR colors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::content::with_default_scheme;
use crate::security::ValidationError;

/// Contrast scanners need at minimum; below this a code is rejected.
pub const MIN_SCANNABLE_CONTRAST: f64 = 3.0;

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#RGB` or `#RRGGBB` (the `#` is optional).
    pub fn from_hex(hex: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidColor(hex.to_string());
        let digits = hex.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match digits.len() {
            3 => {
                let expand = |i: usize| channel(&digits[i..=i].repeat(2));
                Ok(Self::new(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Ok(Self::new(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            _ => Err(invalid()),
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// WCAG 2.x relative luminance in `[0, 1]`.
    pub fn relative_luminance(self) -> f64 {
        fn linear(channel: u8) -> f64 {
            let c = f64::from(channel) / 255.0;
            if c <= 0.03928 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        0.2126 * linear(self.r) + 0.7152 * linear(self.g) + 0.0722 * linear(self.b)
    }

    /// Scales every channel by `1 - amount`.
    pub fn darken(self, amount: f64) -> Self {
        let factor = (1.0 - amount).clamp(0.0, 1.0);
        let scale = |c: u8| (f64::from(c) * factor).round() as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Rgb {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rgb::from_hex(s)
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Rgb::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// WCAG contrast ratio between two colors, rounded to two decimals (1.0 to 21.0).
pub fn contrast_ratio(a: Rgb, b: Rgb) -> f64 {
    let (la, lb) = (a.relative_luminance(), b.relative_luminance());
    let (light, dark) = if la >= lb { (la, lb) } else { (lb, la) };
    let ratio = (light + 0.05) / (dark + 0.05);
    (ratio * 100.0).round() / 100.0
}

/// WCAG conformance bucket for a contrast ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accessibility {
    #[serde(rename = "AAA")]
    Aaa,
    #[serde(rename = "AA")]
    Aa,
    #[serde(rename = "AA Large")]
    AaLarge,
    #[serde(rename = "Fail")]
    Fail,
}

impl Accessibility {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 7.0 {
            Accessibility::Aaa
        } else if ratio >= 4.5 {
            Accessibility::Aa
        } else if ratio >= 3.0 {
            Accessibility::AaLarge
        } else {
            Accessibility::Fail
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Accessibility::Aaa => "AAA",
            Accessibility::Aa => "AA",
            Accessibility::AaLarge => "AA Large",
            Accessibility::Fail => "Fail",
        }
    }
}

impl fmt::Display for Accessibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`validate_qr_colors`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorValidation {
    pub contrast_ratio: f64,
    pub accessibility: Accessibility,
    pub is_valid: bool,
    pub warnings: Vec<String>,
}

/// Foreground/background pair used to render a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QrColors {
    pub foreground: Rgb,
    pub background: Rgb,
}

impl Default for QrColors {
    fn default() -> Self {
        Self {
            foreground: Rgb::BLACK,
            background: Rgb::WHITE,
        }
    }
}

impl QrColors {
    pub fn validate(&self) -> ColorValidation {
        check_colors(self.foreground, self.background)
    }
}

/// Checks that a foreground/background pair will scan reliably.
///
/// # Example
///
/// ```rust
/// use qrsmith::colors::{validate_qr_colors, Accessibility};
///
/// let check = validate_qr_colors("#000000", "#FFFFFF").unwrap();
/// assert_eq!(check.contrast_ratio, 21.0);
/// assert_eq!(check.accessibility, Accessibility::Aaa);
/// ```
pub fn validate_qr_colors(
    foreground: &str,
    background: &str,
) -> Result<ColorValidation, ValidationError> {
    Ok(check_colors(Rgb::from_hex(foreground)?, Rgb::from_hex(background)?))
}

fn check_colors(fg: Rgb, bg: Rgb) -> ColorValidation {
    let ratio = contrast_ratio(fg, bg);
    let accessibility = Accessibility::from_ratio(ratio);
    let inverted = fg.relative_luminance() > bg.relative_luminance();

    let mut warnings = Vec::new();
    if ratio < MIN_SCANNABLE_CONTRAST {
        warnings.push(format!(
            "Contrast {ratio}:1 is too low; scanners need at least {MIN_SCANNABLE_CONTRAST}:1"
        ));
    } else if ratio < 4.5 {
        warnings.push("Low contrast may fail in poor lighting".to_string());
    }
    if inverted {
        warnings.push("Light-on-dark codes are not supported by many scanners".to_string());
    }

    ColorValidation {
        contrast_ratio: ratio,
        accessibility,
        is_valid: ratio >= MIN_SCANNABLE_CONTRAST && !inverted,
        warnings,
    }
}

/// Darkens `fg` in small steps until it reaches `min_ratio` against `bg`.
pub fn ensure_contrast(fg: Rgb, bg: Rgb, min_ratio: f64) -> Rgb {
    let mut color = fg;
    for _ in 0..50 {
        if contrast_ratio(color, bg) >= min_ratio {
            return color;
        }
        color = color.darken(0.08);
    }
    Rgb::BLACK
}

/// A well-known brand and its primary color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrandPalette {
    pub name: &'static str,
    pub domains: &'static [&'static str],
    pub primary: Rgb,
}

const fn brand(name: &'static str, domains: &'static [&'static str], primary: Rgb) -> BrandPalette {
    BrandPalette {
        name,
        domains,
        primary,
    }
}

pub static BRANDS: &[BrandPalette] = &[
    brand("Facebook", &["facebook.com", "fb.com", "fb.me"], Rgb::new(0x18, 0x77, 0xF2)),
    brand("Instagram", &["instagram.com"], Rgb::new(0xE4, 0x40, 0x5F)),
    brand("X", &["x.com", "twitter.com"], Rgb::new(0x00, 0x00, 0x00)),
    brand("LinkedIn", &["linkedin.com", "lnkd.in"], Rgb::new(0x0A, 0x66, 0xC2)),
    brand("YouTube", &["youtube.com", "youtu.be"], Rgb::new(0xFF, 0x00, 0x00)),
    brand("GitHub", &["github.com"], Rgb::new(0x18, 0x17, 0x17)),
    brand("Spotify", &["spotify.com", "spoti.fi"], Rgb::new(0x1D, 0xB9, 0x54)),
    brand("WhatsApp", &["whatsapp.com", "wa.me"], Rgb::new(0x25, 0xD3, 0x66)),
    brand("TikTok", &["tiktok.com"], Rgb::new(0x01, 0x01, 0x01)),
    brand("Twitch", &["twitch.tv"], Rgb::new(0x91, 0x46, 0xFF)),
    brand("Pinterest", &["pinterest.com", "pin.it"], Rgb::new(0xE6, 0x00, 0x23)),
    brand("Amazon", &["amazon.com", "amzn.to"], Rgb::new(0xFF, 0x99, 0x00)),
];

/// Finds the brand a URL belongs to; subdomains match their parent domain.
pub fn brand_for_url(url: &str) -> Option<&'static BrandPalette> {
    let parsed = Url::parse(&with_default_scheme(url)).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    BRANDS.iter().find(|brand| {
        brand
            .domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    })
}

/// Brand-tinted colors for a URL, darkened to AA contrast against white.
pub fn brand_colors(url: &str) -> Option<QrColors> {
    let brand = brand_for_url(url)?;
    Some(QrColors {
        foreground: ensure_contrast(brand.primary, Rgb::WHITE, 4.5),
        background: Rgb::WHITE,
    })
}

/// Named color presets offered in the style picker.
pub fn preset(name: &str) -> Option<QrColors> {
    let foreground = match name.trim().to_ascii_lowercase().as_str() {
        "classic" => Rgb::BLACK,
        "ocean" => Rgb::new(0x0B, 0x4F, 0x8A),
        "forest" => Rgb::new(0x1B, 0x5E, 0x20),
        "sunset" => Rgb::new(0xB3, 0x3A, 0x0C),
        "midnight" => Rgb::new(0x1A, 0x1A, 0x40),
        "grape" => Rgb::new(0x5B, 0x21, 0x82),
        _ => return None,
    };
    Some(QrColors {
        foreground,
        background: Rgb::WHITE,
    })
}

pub const PRESET_NAMES: [&str; 6] = ["classic", "ocean", "forest", "sunset", "midnight", "grape"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(Rgb::from_hex("#fff").unwrap(), Rgb::WHITE);
        assert_eq!(Rgb::from_hex("1877f2").unwrap(), Rgb::new(0x18, 0x77, 0xF2));
        assert_eq!(Rgb::new(10, 11, 255).to_hex(), "#0A0BFF");
        assert!(Rgb::from_hex("#12345").is_err());
        assert!(Rgb::from_hex("#GGGGGG").is_err());
    }

    #[test]
    fn test_black_on_white_is_maximum() {
        let check = validate_qr_colors("#000000", "#FFFFFF").unwrap();
        assert_eq!(check.contrast_ratio, 21.0);
        assert_eq!(check.accessibility, Accessibility::Aaa);
        assert!(check.is_valid);
        assert!(check.warnings.is_empty());
    }

    #[test]
    fn test_contrast_is_symmetric() {
        let a = Rgb::new(0x0A, 0x66, 0xC2);
        assert_eq!(contrast_ratio(a, Rgb::WHITE), contrast_ratio(Rgb::WHITE, a));
        assert_eq!(contrast_ratio(a, a), 1.0);
    }

    #[test]
    fn test_low_contrast_and_inverted() {
        let low = validate_qr_colors("#CCCCCC", "#FFFFFF").unwrap();
        assert_eq!(low.accessibility, Accessibility::Fail);
        assert!(!low.is_valid);

        let inverted = validate_qr_colors("#FFFFFF", "#000000").unwrap();
        assert_eq!(inverted.contrast_ratio, 21.0);
        assert!(!inverted.is_valid);
        assert!(inverted.warnings.iter().any(|w| w.contains("Light-on-dark")));
    }

    #[test]
    fn test_accessibility_buckets() {
        assert_eq!(Accessibility::from_ratio(7.0), Accessibility::Aaa);
        assert_eq!(Accessibility::from_ratio(4.5), Accessibility::Aa);
        assert_eq!(Accessibility::from_ratio(3.2), Accessibility::AaLarge);
        assert_eq!(Accessibility::from_ratio(2.9), Accessibility::Fail);
    }

    #[test]
    fn test_brand_lookup() {
        assert_eq!(brand_for_url("https://www.linkedin.com/in/ada").unwrap().name, "LinkedIn");
        assert_eq!(brand_for_url("youtu.be/abc").unwrap().name, "YouTube");
        assert!(brand_for_url("https://notfacebook.com").is_none());
        assert!(brand_for_url("https://example.com").is_none());
    }

    #[test]
    fn test_brand_colors_reach_aa() {
        let colors = brand_colors("https://open.spotify.com/track/1").unwrap();
        assert!(contrast_ratio(colors.foreground, colors.background) >= 4.5);
        assert_ne!(colors.foreground, Rgb::BLACK);
    }

    #[test]
    fn test_presets_are_scannable() {
        for name in PRESET_NAMES {
            assert!(preset(name).unwrap().validate().is_valid, "{name}");
        }
        assert!(preset("neon").is_none());
    }

    #[test]
    fn test_rgb_serde() {
        let colors = QrColors::default();
        let json = serde_json::to_string(&colors).unwrap();
        assert_eq!(json, r##"{"foreground":"#000000","background":"#FFFFFF"}"##);
        let back: QrColors = serde_json::from_str(&json).unwrap();
        assert_eq!(back, colors);
    }
}
