//! Client for the AI art function that turns QR content into a stylized image.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MAX_ART_CONTENT_CHARS: usize = 1000;

#[derive(Debug, Error)]
pub enum ArtError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Rate limit exceeded. Please wait a moment and try again.")]
    RateLimited,

    #[error("AI credits exhausted. Please add credits to continue.")]
    QuotaExhausted,

    #[error("Art service error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for ArtError {
    fn from(err: reqwest::Error) -> Self {
        ArtError::Network(err.to_string())
    }
}

/// Maps a failed response to the error shown to the user.
pub fn classify_status(status: StatusCode, message: String) -> ArtError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ArtError::RateLimited,
        StatusCode::PAYMENT_REQUIRED => ArtError::QuotaExhausted,
        _ => ArtError::Upstream {
            status: status.as_u16(),
            message,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtStyle {
    #[default]
    Artistic,
    Cyberpunk,
    Watercolor,
    Minimalist,
    Nature,
    Abstract,
}

impl ArtStyle {
    pub const ALL: [ArtStyle; 6] = [
        ArtStyle::Artistic,
        ArtStyle::Cyberpunk,
        ArtStyle::Watercolor,
        ArtStyle::Minimalist,
        ArtStyle::Nature,
        ArtStyle::Abstract,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtStyle::Artistic => "artistic",
            ArtStyle::Cyberpunk => "cyberpunk",
            ArtStyle::Watercolor => "watercolor",
            ArtStyle::Minimalist => "minimalist",
            ArtStyle::Nature => "nature",
            ArtStyle::Abstract => "abstract",
        }
    }

    pub fn descriptor(self) -> &'static str {
        match self {
            ArtStyle::Artistic => {
                "a painterly illustration with rich colors and soft brush strokes"
            }
            ArtStyle::Cyberpunk => "neon-lit cyberpunk city textures in magenta and cyan",
            ArtStyle::Watercolor => "loose watercolor washes on textured paper",
            ArtStyle::Minimalist => "clean minimalist geometry with a restrained two-tone palette",
            ArtStyle::Nature => "leaves, vines and flowers woven through the modules",
            ArtStyle::Abstract => "bold abstract shapes and gradients",
        }
    }
}

impl fmt::Display for ArtStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtStyle {
    type Err = ArtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtStyle::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ArtError::InvalidInput(format!("Unknown art style: {s}")))
    }
}

/// Prompt forwarded to the image model.
pub fn build_prompt(content: &str, style: ArtStyle) -> String {
    format!(
        "Create an artistic QR code that encodes \"{}\". Style: {}. Keep the three finder \
         patterns and a light quiet zone clearly visible so the code stays scannable.",
        content.trim(),
        style.descriptor()
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtRequest {
    pub content: String,
    pub style: ArtStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl ArtRequest {
    pub fn new(content: impl Into<String>, style: ArtStyle) -> Self {
        Self {
            content: content.into(),
            style,
            prompt: None,
        }
    }

    fn validate(&self) -> Result<(), ArtError> {
        let len = self.content.trim().chars().count();
        if len == 0 {
            return Err(ArtError::InvalidInput("Content is required".into()));
        }
        if len > MAX_ART_CONTENT_CHARS {
            return Err(ArtError::InvalidInput(format!(
                "Content must be at most {MAX_ART_CONTENT_CHARS} characters"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtResponse {
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(rename = "imageUrl")]
    image_url: Option<String>,
    error: Option<String>,
}

pub struct ArtClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ArtClient {
    pub fn new(endpoint: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self, ArtError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
        })
    }

    fn headers(&self) -> Result<HeaderMap, ArtError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| ArtError::InvalidInput(format!("invalid API key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Requests a stylized image for `request.content`. Failures are returned as-is; the
    /// caller decides whether to try again.
    pub async fn generate(&self, request: &ArtRequest) -> Result<ArtResponse, ArtError> {
        request.validate()?;
        let mut body = request.clone();
        if body.prompt.is_none() {
            body.prompt = Some(build_prompt(&body.content, body.style));
        }

        debug!(style = %request.style, endpoint = %self.endpoint, "art generation request");

        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        let wire: Option<WireResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = wire
                .and_then(|w| w.error)
                .unwrap_or_else(|| text.trim().to_string());
            warn!(status = status.as_u16(), %message, "art generation failed");
            return Err(classify_status(status, message));
        }

        match wire {
            Some(WireResponse {
                image_url: Some(image_url),
                ..
            }) => {
                info!(style = %request.style, "art generated");
                Ok(ArtResponse { image_url })
            }
            Some(WireResponse {
                error: Some(message),
                ..
            }) => Err(ArtError::Upstream {
                status: status.as_u16(),
                message,
            }),
            _ => Err(ArtError::Upstream {
                status: status.as_u16(),
                message: "response did not include an image".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ArtClient {
        ArtClient::new(
            &format!("{}/generate-qr-art", server.uri()),
            Some("test-key"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ArtError::RateLimited
        ));
        assert!(matches!(
            classify_status(StatusCode::PAYMENT_REQUIRED, String::new()),
            ArtError::QuotaExhausted
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "boom".into()),
            ArtError::Upstream { status: 502, .. }
        ));
    }

    #[test]
    fn test_style_wire_names() {
        assert_eq!(serde_json::to_value(ArtStyle::Cyberpunk).unwrap(), json!("cyberpunk"));
        assert_eq!("Watercolor".parse::<ArtStyle>().unwrap(), ArtStyle::Watercolor);
        assert!("vaporwave".parse::<ArtStyle>().is_err());
    }

    #[test]
    fn test_build_prompt_mentions_content_and_style() {
        let prompt = build_prompt(" https://example.com ", ArtStyle::Nature);
        assert!(prompt.contains("\"https://example.com\""));
        assert!(prompt.contains("vines"));
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-qr-art"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(
                json!({"content": "https://example.com", "style": "minimalist"}),
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"imageUrl": "data:image/png;base64,AAA"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let resp = client
            .generate(&ArtRequest::new("https://example.com", ArtStyle::Minimalist))
            .await
            .unwrap();
        assert_eq!(resp.image_url, "data:image/png;base64,AAA");
    }

    #[tokio::test]
    async fn test_generate_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": "slow down"})))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .generate(&ArtRequest::new("hello", ArtStyle::Abstract))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtError::RateLimited));
    }

    #[tokio::test]
    async fn test_generate_quota_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_string("payment required"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .generate(&ArtRequest::new("hello", ArtStyle::Abstract))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtError::QuotaExhausted));
    }

    #[tokio::test]
    async fn test_generate_upstream_error_keeps_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "model offline"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .generate(&ArtRequest::new("hello", ArtStyle::Artistic))
            .await
            .unwrap_err();
        match err {
            ArtError::Upstream { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "model offline");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_content_never_hits_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .generate(&ArtRequest::new("   ", ArtStyle::Artistic))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtError::InvalidInput(_)));
    }
}
