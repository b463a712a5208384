//! Context-aware suggestions backed by local usage analytics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::ContentType;
use crate::optimize::MAX_QR_BYTES;

/// Smallest printed module size that phone cameras resolve reliably, in millimetres.
pub const MIN_MODULE_MM: f64 = 0.4;
const QUIET_ZONE_MODULES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour % 24 {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=20 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

/// Counters kept across sessions in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageAnalytics {
    pub content_types: BTreeMap<ContentType, u64>,
    pub total_generations: u64,
    pub average_length: f64,
    pub hour_histogram: [u32; 24],
}

impl Default for UsageAnalytics {
    fn default() -> Self {
        Self {
            content_types: BTreeMap::new(),
            total_generations: 0,
            average_length: 0.0,
            hour_histogram: [0; 24],
        }
    }
}

impl UsageAnalytics {
    pub fn record(&mut self, content_type: ContentType, length: usize, hour: u32) {
        *self.content_types.entry(content_type).or_insert(0) += 1;
        self.total_generations += 1;
        let n = self.total_generations as f64;
        self.average_length += (length as f64 - self.average_length) / n;
        self.hour_histogram[(hour % 24) as usize] += 1;
    }

    /// Most frequently generated type; ties go to the earlier variant.
    pub fn most_used_type(&self) -> Option<ContentType> {
        self.content_types
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(t, _)| *t)
    }

    pub fn peak_hour(&self) -> Option<u32> {
        if self.total_generations == 0 {
            return None;
        }
        self.hour_histogram
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(h, _)| h as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Tip,
    Warning,
    Template,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub message: String,
}

impl Suggestion {
    fn new(kind: SuggestionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Minimum printed width in centimetres for a code `modules` wide, quiet zone included.
pub fn recommended_print_size_cm(modules: usize) -> f64 {
    let mm = (modules + 2 * QUIET_ZONE_MODULES) as f64 * MIN_MODULE_MM;
    mm.ceil() / 10.0
}

/// Turns the current input plus usage history into suggestions.
pub struct ContextAnalyzer<'a> {
    analytics: &'a UsageAnalytics,
}

impl<'a> ContextAnalyzer<'a> {
    pub fn new(analytics: &'a UsageAnalytics) -> Self {
        Self { analytics }
    }

    pub fn suggest(&self, content_type: ContentType, length: usize, hour: u32) -> Vec<Suggestion> {
        let mut out = Vec::new();

        let tip = match content_type {
            ContentType::Wifi => {
                "Place WiFi codes where guests wait and print them at least 3 cm wide"
            }
            ContentType::Url => {
                "Add a short call to action such as \"Scan to visit\" next to the code"
            }
            ContentType::Vcard => "Contact cards make dense codes; print them at least 4 cm wide",
            ContentType::Geo => {
                "Mention the place name next to the code so people know where it leads"
            }
            ContentType::Phone => "Phone codes open the dialer; say who will answer",
            ContentType::Email => "Pre-fill a subject so incoming mail is easy to sort",
            ContentType::Text => "Plain text is shown as-is; keep it short",
        };
        out.push(Suggestion::new(SuggestionKind::Tip, tip));

        if length > MAX_QR_BYTES * 8 / 10 {
            out.push(Suggestion::new(
                SuggestionKind::Warning,
                format!(
                    "Content uses {length} of {MAX_QR_BYTES} bytes; the code will be very dense"
                ),
            ));
        }

        if TimeOfDay::from_hour(hour) == TimeOfDay::Night {
            out.push(Suggestion::new(
                SuggestionKind::Tip,
                "Codes scanned in dim light need strong contrast; keep a white background",
            ));
        }

        if self.analytics.total_generations >= 5 {
            if let Some(favorite) = self.analytics.most_used_type() {
                if favorite != content_type && favorite != ContentType::Text {
                    out.push(Suggestion::new(
                        SuggestionKind::Template,
                        format!(
                            "You often create {} codes; start from that template",
                            favorite.label()
                        ),
                    ));
                }
            }
        }

        out
    }
}
