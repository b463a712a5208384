//! # qrsmith
//!
//! A Rust library for turning free-form input into scannable QR codes.
//!
//! `qrsmith` classifies what the user typed (link, email, phone number, WiFi network, contact
//! card, location or plain text), cleans it up, picks an error correction level and hands the
//! bytes to the [`qrcode`](https://docs.rs/qrcode) crate for encoding. The resulting symbol is
//! rendered as a PNG data URL, SVG or terminal preview.
//!
//! ## Features
//!
//! - Detect the content type and normalize it (tracking parameters, `tel:`/`mailto:` forms,
//!   whitespace and typographic punctuation).
//! - Build WiFi, vCard, geo, email, SMS and phone payloads.
//! - Reject unsafe URLs, strip markup from input, and rate-limit features with a sliding window.
//! - Check foreground/background contrast (WCAG ratios) and suggest brand palettes.
//! - Generate batches, debounce live previews, and keep local usage analytics.
//! - Talk to an AI art function and a rule-based chat assistant.
//!
//! ## Installation
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! qrsmith = "0.1" # Replace with the latest version
//! ```
//!
//! ## Example
//!
//! Generate a code from whatever the user typed:
//!
//! ```rust
//! use qrsmith::content::ContentType;
//! use qrsmith::generator::QrGenerator;
//! use qrsmith::render::RenderOptions;
//! use qrsmith::security::default_rules;
//!
//! let mut generator = QrGenerator::new(RenderOptions::default(), default_rules());
//! let qr = generator.generate("https://example.com/?utm_source=newsletter").unwrap();
//! assert_eq!(qr.content_type, ContentType::Url);
//! assert_eq!(qr.content, "https://example.com/");
//! assert!(qr.data_url.starts_with("data:image/png;base64,"));
//! ```
//!
//! Build a WiFi payload:
//!
//! ```rust
//! use qrsmith::format::{format_wifi, WifiConfig, WifiSecurity};
//!
//! let config = WifiConfig::new("Home", "hunter2222", WifiSecurity::Wpa);
//! assert_eq!(format_wifi(&config), "WIFI:T:WPA;S:Home;P:hunter2222;;");
//! ```
//!
//! ## Modules
//!
//! - [`content`]: Content type detection.
//! - [`optimize`]: Normalization and error correction selection.
//! - [`format`]: Structured payload builders.
//! - [`security`]: Validation, sanitization and rate limiting.
//! - [`colors`]: Contrast checks, presets and brand palettes.
//! - [`context`]: Usage analytics and suggestions.
//! - [`render`]: Encoding and image/SVG/terminal output.
//! - [`generator`]: The generation pipeline, batches and debounced preview.
//! - [`art`]: AI art client.
//! - [`assistant`]: Chat assistant.
//! - [`store`]: Local JSON storage.
//! - [`config`]: Settings file.

pub mod art;
pub mod assistant;
pub mod colors;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod format;
pub mod generator;
pub mod optimize;
pub mod render;
pub mod security;
pub mod store;

pub use error::{Error, Result};
