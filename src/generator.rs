//! Generation pipeline: rate limiting, sanitizing, optimizing, validating, encoding and
//! rendering, plus batch mode and a debounced live preview.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike, Utc};
use image::RgbaImage;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::colors::{ColorValidation, QrColors};
use crate::content::ContentType;
use crate::context::{ContextAnalyzer, Suggestion, UsageAnalytics};
use crate::error::{Error, Result};
use crate::format::{format_vcard, format_wifi, ContactCard, WifiConfig};
use crate::optimize::{optimize_as, optimize_for_qr, recommended_ecc, EccLevel, Optimization};
use crate::render::{
    encode, save_png, to_data_url, to_image, to_svg_string, QrMatrix, RenderOptions,
};
use crate::security::{sanitize_input, validate_content, RateLimitRule, RateLimiter};
use crate::store::{LocalStore, ANALYTICS_KEY, RATE_LIMITS_KEY};

pub const HISTORY_LIMIT: usize = 20;
pub const MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// A rendered code and everything learned while producing it.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedQr {
    pub content: String,
    pub content_type: ContentType,
    pub ecc: EccLevel,
    pub data_url: String,
    pub svg: String,
    /// Image width in pixels.
    pub width: u32,
    /// Symbol width in modules, quiet zone excluded.
    pub modules: i32,
    pub optimization: Optimization,
    pub color_check: ColorValidation,
    #[serde(skip)]
    pub matrix: QrMatrix,
    #[serde(skip)]
    pub image: RgbaImage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub content: String,
    pub content_type: ContentType,
    pub created_at: DateTime<Utc>,
}

/// Runs the stateless part of the pipeline on `input`.
///
/// `content_type` skips detection for payloads built by the structured formatters; those are
/// escaped by their builders and are not sanitized again.
pub fn build_qr(
    input: &str,
    content_type: Option<ContentType>,
    options: &RenderOptions,
) -> Result<GeneratedQr> {
    let optimization = match content_type {
        Some(content_type) => {
            let content = optimize_as(input, content_type);
            Optimization {
                ecc: recommended_ecc(content_type, content.len()),
                original_length: input.len(),
                optimized_length: content.len(),
                content,
                content_type,
                suggestions: Vec::new(),
            }
        }
        None => optimize_for_qr(&sanitize_input(input)),
    };
    validate_content(&optimization.content, optimization.content_type)?;

    let color_check = options.colors.validate();
    if !color_check.is_valid {
        return Err(Error::Colors(color_check.warnings.join("; ")));
    }

    let ecc = options.ecc.unwrap_or(optimization.ecc);
    let matrix = encode(&optimization.content, ecc)?;
    let image = to_image(&matrix, options);
    let data_url = to_data_url(&image)?;
    let svg = to_svg_string(&matrix, options);

    Ok(GeneratedQr {
        content: optimization.content.clone(),
        content_type: optimization.content_type,
        ecc,
        data_url,
        svg,
        width: image.width(),
        modules: matrix.size(),
        optimization,
        color_check,
        matrix,
        image,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    /// 1-based position among the non-blank input lines.
    pub index: usize,
    pub qr: GeneratedQr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub input: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.items.len() + self.failures.len()
    }
}

/// Writes each successful batch item as `qr_<index>.png` under `dir`.
pub fn save_batch(report: &BatchReport, dir: &Path) -> Result<Vec<PathBuf>> {
    report
        .items
        .iter()
        .map(|item| save_png(&item.qr.image, Some(dir), Some(&format!("qr_{}.png", item.index))))
        .collect()
}

/// Stateful front end: owns the render settings, rate limiter, analytics and history.
pub struct QrGenerator {
    options: RenderOptions,
    limiter: RateLimiter,
    analytics: UsageAnalytics,
    history: VecDeque<HistoryEntry>,
    store: LocalStore,
}

impl QrGenerator {
    pub fn new(options: RenderOptions, rules: HashMap<String, RateLimitRule>) -> Self {
        Self::with_store(options, rules, LocalStore::in_memory())
    }

    /// Restores analytics and rate-limit windows from `store`.
    pub fn with_store(
        options: RenderOptions,
        rules: HashMap<String, RateLimitRule>,
        store: LocalStore,
    ) -> Self {
        let analytics = store.get(ANALYTICS_KEY).unwrap_or_default();
        let windows: HashMap<String, Vec<DateTime<Utc>>> =
            store.get(RATE_LIMITS_KEY).unwrap_or_default();
        Self {
            options,
            limiter: RateLimiter::new(rules).with_state(windows),
            analytics,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            store,
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: RenderOptions) {
        self.options = options;
    }

    pub fn set_colors(&mut self, colors: QrColors) {
        self.options.colors = colors;
    }

    pub fn set_ecc(&mut self, ecc: Option<EccLevel>) {
        self.options.ecc = ecc;
    }

    pub fn analytics(&self) -> &UsageAnalytics {
        &self.analytics
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn limiter_mut(&mut self) -> &mut RateLimiter {
        &mut self.limiter
    }

    /// Most recent first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn suggestions(&self, content_type: ContentType, length: usize) -> Vec<Suggestion> {
        ContextAnalyzer::new(&self.analytics).suggest(content_type, length, Local::now().hour())
    }

    pub fn generate(&mut self, input: &str) -> Result<GeneratedQr> {
        self.generate_at(input, None, Utc::now())
    }

    pub fn generate_wifi(&mut self, config: &WifiConfig) -> Result<GeneratedQr> {
        config.validate()?;
        self.generate_at(&format_wifi(config), Some(ContentType::Wifi), Utc::now())
    }

    pub fn generate_contact(&mut self, card: &ContactCard) -> Result<GeneratedQr> {
        card.validate()?;
        self.generate_at(&format_vcard(card), Some(ContentType::Vcard), Utc::now())
    }

    fn generate_at(
        &mut self,
        input: &str,
        content_type: Option<ContentType>,
        now: DateTime<Utc>,
    ) -> Result<GeneratedQr> {
        self.limiter.check("generate", now)?;
        let qr = build_qr(input, content_type, &self.options)?;
        self.record(&qr, now);
        info!(
            content_type = %qr.content_type,
            ecc = %qr.ecc,
            modules = qr.modules,
            "generated QR code"
        );
        Ok(qr)
    }

    /// Generates one code per non-blank line. Per-line failures are collected, not returned.
    pub fn generate_batch<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<BatchReport> {
        let entries: Vec<&str> = lines
            .iter()
            .map(|l| l.as_ref().trim())
            .filter(|l| !l.is_empty())
            .collect();
        if entries.len() > MAX_BATCH_SIZE {
            return Err(Error::BatchTooLarge(entries.len()));
        }
        let now = Utc::now();
        self.limiter.check("batch", now)?;

        let mut report = BatchReport::default();
        for (i, input) in entries.into_iter().enumerate() {
            let index = i + 1;
            match build_qr(input, None, &self.options) {
                Ok(qr) => {
                    self.record(&qr, now);
                    report.items.push(BatchItem { index, qr });
                }
                Err(e) => {
                    warn!(index, error = %e, "batch entry failed");
                    report.failures.push(BatchFailure {
                        index,
                        input: input.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            generated = report.items.len(),
            failed = report.failures.len(),
            "batch complete"
        );
        Ok(report)
    }

    fn record(&mut self, qr: &GeneratedQr, now: DateTime<Utc>) {
        self.analytics
            .record(qr.content_type, qr.content.len(), Local::now().hour());
        self.history.push_front(HistoryEntry {
            content: qr.content.clone(),
            content_type: qr.content_type,
            created_at: now,
        });
        self.history.truncate(HISTORY_LIMIT);
    }

    /// Writes analytics and live rate-limit windows back to the store.
    pub fn persist(&mut self) -> Result<()> {
        self.limiter.prune_empty(Utc::now());
        self.store.set(ANALYTICS_KEY, &self.analytics)?;
        self.store.set(RATE_LIMITS_KEY, self.limiter.state())?;
        self.store.save()
    }
}

/// What the live preview currently shows.
#[derive(Debug, Clone, Default)]
pub enum PreviewState {
    #[default]
    Idle,
    Ready(Arc<GeneratedQr>),
    Failed(String),
}

/// Re-renders a preview once input has been quiet for `delay`.
///
/// Each [`schedule`](Self::schedule) aborts the pending render, so only the last input of a
/// burst is encoded. Results are published on a watch channel.
pub struct PreviewDebouncer {
    delay: Duration,
    options: RenderOptions,
    pending: Option<JoinHandle<()>>,
    tx: watch::Sender<PreviewState>,
}

impl PreviewDebouncer {
    pub fn new(options: RenderOptions, delay: Duration) -> Self {
        let (tx, _) = watch::channel(PreviewState::Idle);
        Self {
            delay,
            options,
            pending: None,
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.tx.subscribe()
    }

    pub fn set_options(&mut self, options: RenderOptions) {
        self.options = options;
    }

    pub fn schedule(&mut self, input: impl Into<String>) {
        self.cancel();
        let input = input.into();
        if input.trim().is_empty() {
            self.tx.send_replace(PreviewState::Idle);
            return;
        }

        let delay = self.delay;
        let options = self.options;
        let tx = self.tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let state = match build_qr(&input, None, &options) {
                Ok(qr) => PreviewState::Ready(Arc::new(qr)),
                Err(e) => PreviewState::Failed(e.to_string()),
            };
            debug!(ok = matches!(state, PreviewState::Ready(_)), "preview rendered");
            tx.send_replace(state);
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PreviewDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
