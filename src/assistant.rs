//! Rule-based chat assistant that turns plain-language requests into generator actions.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::colors::{preset, QrColors, Rgb, PRESET_NAMES};
use crate::content::{detect_content_type, is_phone_number, ContentType};
use crate::format::{format_vcard, format_wifi, ContactCard, WifiConfig, WifiSecurity};

pub const TRANSCRIPT_LIMIT: usize = 50;

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:hi|hello|hey|hiya|good\s+(?:morning|afternoon|evening))(?:\s+there)?[\s!.,]*$",
    )
    .unwrap()
});
static HELP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:help|\?)\s*$|\bwhat can you do\b|\bhow does (?:this|it) work\b")
        .unwrap()
});
static WIFI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:wi-?fi|ssid|wireless)\b").unwrap());
static SSID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:ssid|network(?:\s+name)?|wi-?fi\s+name)\s*(?:is\b|:|=|called\b|named\b)?\s*(?:"([^"]+)"|'([^']+)'|([^\s"',;]+))"#,
    )
    .unwrap()
});
static PASSWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:password|passphrase|pass|pwd)\s*(?:is\b|:|=)?\s*(?:"([^"]+)"|'([^']+)'|([^\s"',;]+))"#,
    )
    .unwrap()
});
static OPEN_NETWORK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:open\s+network|no\s+password|nopass|without\s+(?:a\s+)?password)\b")
        .unwrap()
});
static WEP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bwep\b").unwrap());
static CONTACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:contact|vcard|v-card|business\s+card)\b").unwrap());
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(?i:name)\s*(?:(?i:is)\b|:)?|(?i:for))\s+([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*)?)")
        .unwrap()
});
static EMAIL_FIND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}").unwrap()
});
static PHONE_FIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s().-]{5,}\d").unwrap());
static URL_FIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhttps?://[^\s<>"']+|\bwww\.[^\s<>"']+"#).unwrap());
static COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:colou?rs?|foreground|background|theme|preset|palette)\b").unwrap()
});
static HEX_FIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(?:[0-9a-fA-F]{6}|[0-9a-fA-F]{3})\b").unwrap());
static QR_REQUEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:(?:make|create|generate|build|give\s+me)\s+(?:me\s+)?(?:an?\s+)?)?qr(?:\s*code)?\b\s*(?:(?:for|with|of|that\s+says|saying|containing)\b)?\s*:?\s*",
    )
    .unwrap()
});

const HELP_TEXT: &str = "I can build QR codes from plain language. Try:\n\
  - \"https://example.com\" or any link, email address or phone number\n\
  - \"WiFi network \\\"Home\\\" password hunter22\"\n\
  - \"contact card for Ada Lovelace, ada@example.com, +44 20 7946 0958\"\n\
  - \"colors #0B4F8A on #FFFFFF\" or \"use the ocean preset\"\n\
  - anything else becomes a plain text code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

/// Something the caller should do with the reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantAction {
    Generate {
        content: String,
        content_type: ContentType,
    },
    SetColors(QrColors),
    ShowHelp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistantReply {
    pub text: String,
    pub action: Option<AssistantAction>,
}

impl AssistantReply {
    fn say(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: None,
        }
    }

    fn generate(content: String, content_type: ContentType) -> Self {
        Self {
            text: format!("Created a {} QR code.", content_type.label()),
            action: Some(AssistantAction::Generate {
                content,
                content_type,
            }),
        }
    }
}

/// Chat session with a bounded transcript.
#[derive(Debug, Clone, Default)]
pub struct Assistant {
    transcript: VecDeque<ChatMessage>,
}

impl Assistant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&mut self, message: &str) -> AssistantReply {
        let reply = interpret(message);
        self.push(Role::User, message);
        self.push(Role::Assistant, &reply.text);
        reply
    }

    pub fn transcript(&self) -> impl Iterator<Item = &ChatMessage> {
        self.transcript.iter()
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    fn push(&mut self, role: Role, text: &str) {
        if self.transcript.len() == TRANSCRIPT_LIMIT {
            self.transcript.pop_front();
        }
        self.transcript.push_back(ChatMessage {
            role,
            text: text.to_string(),
        });
    }
}

/// Maps one message to a reply without touching any session state.
pub fn interpret(message: &str) -> AssistantReply {
    let text = message.trim();
    if text.is_empty() {
        return AssistantReply::say("Tell me what you'd like to turn into a QR code.");
    }
    if GREETING_RE.is_match(text) {
        return AssistantReply::say(
            "Hi! Send me a link, WiFi details, contact info or any text and I'll make a QR code.",
        );
    }
    if HELP_RE.is_match(text) {
        return AssistantReply {
            text: HELP_TEXT.to_string(),
            action: Some(AssistantAction::ShowHelp),
        };
    }
    if WIFI_RE.is_match(text) {
        return wifi_reply(text);
    }
    if CONTACT_RE.is_match(text) {
        return contact_reply(text);
    }

    let url = URL_FIND_RE.find(text).map(|m| trim_trailing_punctuation(m.as_str()));
    if COLOR_RE.is_match(text) || (url.is_none() && HEX_FIND_RE.is_match(text)) {
        return color_reply(text);
    }
    if let Some(url) = url {
        return AssistantReply::generate(url.to_string(), ContentType::Url);
    }
    if let Some(email) = EMAIL_FIND_RE.find(text) {
        return AssistantReply::generate(email.as_str().to_string(), ContentType::Email);
    }
    if let Some(phone) = find_phone(text) {
        return AssistantReply::generate(phone, ContentType::Phone);
    }

    let content = QR_REQUEST_RE
        .find(text)
        .map_or(text, |m| &text[m.end()..])
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();
    if content.is_empty() {
        return AssistantReply::say("What should the QR code contain?");
    }
    debug!(len = content.len(), "assistant fell back to content detection");
    AssistantReply::generate(content.to_string(), detect_content_type(content))
}

fn first_group(caps: Captures<'_>) -> Option<String> {
    (1..=3)
        .find_map(|i| caps.get(i))
        .map(|m| m.as_str().trim().to_string())
}

fn trim_trailing_punctuation(s: &str) -> &str {
    s.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']'])
}

fn find_phone(text: &str) -> Option<String> {
    PHONE_FIND_RE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .find(|candidate| is_phone_number(candidate))
        .map(String::from)
}

fn wifi_reply(text: &str) -> AssistantReply {
    let Some(ssid) = SSID_RE.captures(text).and_then(first_group) else {
        return AssistantReply::say(
            "What's the network name? For example: WiFi network \"Home\" password hunter22",
        );
    };
    let security = if OPEN_NETWORK_RE.is_match(text) {
        WifiSecurity::Nopass
    } else if WEP_RE.is_match(text) {
        WifiSecurity::Wep
    } else {
        WifiSecurity::Wpa
    };
    let password = match security {
        WifiSecurity::Nopass => String::new(),
        _ => match PASSWORD_RE.captures(text).and_then(first_group) {
            Some(password) => password,
            None => {
                return AssistantReply::say(format!(
                    "What's the password for \"{ssid}\"? Say \"no password\" for an open network."
                ))
            }
        },
    };

    let config = WifiConfig::new(ssid, password, security);
    if let Err(e) = config.validate() {
        return AssistantReply::say(e.to_string());
    }
    AssistantReply::generate(format_wifi(&config), ContentType::Wifi)
}

fn contact_reply(text: &str) -> AssistantReply {
    let Some(name) = NAME_RE.captures(text).map(|c| c[1].to_string()) else {
        return AssistantReply::say(
            "Whose contact is it? For example: contact card for Ada Lovelace, ada@example.com",
        );
    };
    let (first_name, last_name) = match name.split_once(char::is_whitespace) {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name, String::new()),
    };
    let card = ContactCard {
        first_name,
        last_name,
        email: EMAIL_FIND_RE.find(text).map(|m| m.as_str().to_string()),
        phone: find_phone(text),
        ..Default::default()
    };
    if let Err(e) = card.validate() {
        return AssistantReply::say(e.to_string());
    }
    AssistantReply::generate(format_vcard(&card), ContentType::Vcard)
}

fn color_reply(text: &str) -> AssistantReply {
    let hexes: Vec<&str> = HEX_FIND_RE.find_iter(text).map(|m| m.as_str()).collect();
    let colors = match hexes.as_slice() {
        [] => {
            let lower = text.to_ascii_lowercase();
            let Some(colors) = PRESET_NAMES
                .iter()
                .find(|name| lower.split(|c: char| !c.is_ascii_alphanumeric()).any(|w| w == **name))
                .and_then(|name| preset(name))
            else {
                return AssistantReply::say(format!(
                    "Give me hex colors like #0B4F8A on #FFFFFF, or a preset: {}.",
                    PRESET_NAMES.join(", ")
                ));
            };
            colors
        }
        [fg, rest @ ..] => {
            let parsed = Rgb::from_hex(fg).and_then(|foreground| {
                let background = match rest.first() {
                    Some(bg) => Rgb::from_hex(bg)?,
                    None => Rgb::WHITE,
                };
                Ok(QrColors {
                    foreground,
                    background,
                })
            });
            match parsed {
                Ok(colors) => colors,
                Err(e) => return AssistantReply::say(e.to_string()),
            }
        }
    };

    let check = colors.validate();
    if !check.is_valid {
        return AssistantReply::say(format!(
            "Those colors won't scan reliably: {}",
            check.warnings.join("; ")
        ));
    }
    AssistantReply {
        text: format!(
            "Colors set to {} on {} (contrast {}:1, {}).",
            colors.foreground, colors.background, check.contrast_ratio, check.accessibility
        ),
        action: Some(AssistantAction::SetColors(colors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(reply: &AssistantReply) -> (&str, ContentType) {
        match &reply.action {
            Some(AssistantAction::Generate {
                content,
                content_type,
            }) => (content.as_str(), *content_type),
            other => panic!("expected a generate action, got {other:?}"),
        }
    }

    #[test]
    fn test_greeting_and_help() {
        assert_eq!(interpret("Hello there!").action, None);
        assert_eq!(interpret("help").action, Some(AssistantAction::ShowHelp));
        assert_eq!(interpret("What can you do?").action, Some(AssistantAction::ShowHelp));
    }

    #[test]
    fn test_wifi_extraction() {
        let reply =
            interpret(r#"Make a WiFi code for network "Cafe Guest" with password latte1234"#);
        assert_eq!(
            generated(&reply),
            ("WIFI:T:WPA;S:Cafe Guest;P:latte1234;;", ContentType::Wifi)
        );
    }

    #[test]
    fn test_wifi_open_and_wep() {
        let open = interpret("wifi ssid: Lobby, no password");
        assert_eq!(generated(&open).0, "WIFI:T:nopass;S:Lobby;P:;;");

        let wep = interpret("WEP wifi network Legacy password is abcde");
        assert_eq!(generated(&wep).0, "WIFI:T:WEP;S:Legacy;P:abcde;;");
    }

    #[test]
    fn test_wifi_asks_for_missing_details() {
        let reply = interpret("wifi network Home");
        assert_eq!(reply.action, None);
        assert!(reply.text.contains("password for \"Home\""));

        let weak = interpret("wifi network Home password 123");
        assert_eq!(weak.action, None);
    }

    #[test]
    fn test_contact_card() {
        let reply =
            interpret("Create a contact card for Ada Lovelace, ada@example.com, +44 20 7946 0958");
        let (content, content_type) = generated(&reply);
        assert_eq!(content_type, ContentType::Vcard);
        assert!(content.contains("N:Lovelace;Ada"));
        assert!(content.contains("ada@example.com"));
        assert!(content.contains("+44"));

        assert_eq!(interpret("contact please").action, None);
    }

    #[test]
    fn test_colors() {
        let reply = interpret("Set colors #0B4F8A on #FFFFFF");
        assert_eq!(
            reply.action,
            Some(AssistantAction::SetColors(QrColors {
                foreground: Rgb::new(0x0B, 0x4F, 0x8A),
                background: Rgb::WHITE,
            }))
        );

        let low = interpret("colors #EEEEEE #FFFFFF");
        assert_eq!(low.action, None);
        assert!(low.text.contains("won't scan"));

        let preset_reply = interpret("use the forest theme");
        assert_eq!(
            preset_reply.action,
            Some(AssistantAction::SetColors(preset("forest").unwrap()))
        );
    }

    #[test]
    fn test_finds_links_and_addresses() {
        let url = interpret("can you make one for https://example.com/menu.");
        assert_eq!(generated(&url), ("https://example.com/menu", ContentType::Url));

        let with_fragment = interpret("https://example.com/#abc");
        assert_eq!(generated(&with_fragment).1, ContentType::Url);

        let email = interpret("my email is ada@example.com");
        assert_eq!(generated(&email), ("ada@example.com", ContentType::Email));

        let phone = interpret("call me at +1 (555) 123-4567");
        assert_eq!(generated(&phone), ("+1 (555) 123-4567", ContentType::Phone));
    }

    #[test]
    fn test_fallback_text() {
        let reply = interpret("Make a QR code for: Meet me at noon");
        assert_eq!(generated(&reply), ("Meet me at noon", ContentType::Text));

        let plain = interpret("A long day at the beach");
        assert_eq!(generated(&plain).0, "A long day at the beach");

        assert_eq!(interpret("make a qr code").action, None);
    }

    #[test]
    fn test_transcript_is_bounded() {
        let mut assistant = Assistant::new();
        for i in 0..30 {
            assistant.reply(&format!("note {i}"));
        }
        assert_eq!(assistant.transcript().count(), TRANSCRIPT_LIMIT);
        let first = assistant.transcript().next().unwrap();
        assert_eq!(first.role, Role::User);
        assert_eq!(first.text, "note 5");
        assistant.clear();
        assert_eq!(assistant.transcript().count(), 0);
    }
}
