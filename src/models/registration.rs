//! Webhook registrations.

use super::HookEventType;
use crate::{Error, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a webhook registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookId(i64);

impl HookId {
    /// Creates a new hook ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw ID.
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for HookId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Which events a registration applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistrationScope {
    /// Events of one repository.
    Repository {
        /// Repository ID.
        repo_id: i64,
    },
    /// Events of every repository of a user or organization.
    Owner {
        /// Owner ID.
        owner_id: i64,
    },
    /// Every event on the platform.
    System,
}

impl fmt::Display for RegistrationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository { repo_id } => write!(f, "repository:{repo_id}"),
            Self::Owner { owner_id } => write!(f, "owner:{owner_id}"),
            Self::System => f.write_str("system"),
        }
    }
}

/// Payload format of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// The platform's own JSON, passed through unchanged.
    #[default]
    Native,
    /// Gogs-compatible JSON, passed through unchanged.
    Gogs,
    /// Slack incoming webhook.
    Slack,
    /// Discord webhook.
    Discord,
    /// `DingTalk` robot.
    Dingtalk,
    /// Telegram bot `sendMessage`.
    Telegram,
    /// Microsoft Teams connector card.
    #[serde(rename = "msteams")]
    MsTeams,
    /// Feishu (Lark) bot.
    Feishu,
    /// Matrix room message.
    Matrix,
    /// `WeChat` Work robot.
    #[serde(rename = "wechatwork")]
    WechatWork,
    /// Packagist package update hook.
    Packagist,
}

impl ProviderKind {
    /// All provider kinds.
    pub const ALL: [Self; 11] = [
        Self::Native,
        Self::Gogs,
        Self::Slack,
        Self::Discord,
        Self::Dingtalk,
        Self::Telegram,
        Self::MsTeams,
        Self::Feishu,
        Self::Matrix,
        Self::WechatWork,
        Self::Packagist,
    ];

    /// Returns the provider's configuration name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Gogs => "gogs",
            Self::Slack => "slack",
            Self::Discord => "discord",
            Self::Dingtalk => "dingtalk",
            Self::Telegram => "telegram",
            Self::MsTeams => "msteams",
            Self::Feishu => "feishu",
            Self::Matrix => "matrix",
            Self::WechatWork => "wechatwork",
            Self::Packagist => "packagist",
        }
    }

    /// Whether the generic payload is delivered unchanged.
    ///
    /// Native providers receive zero-commit pushes; chat providers do not.
    #[must_use]
    pub const fn is_native(&self) -> bool {
        matches!(self, Self::Native | Self::Gogs)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            // Older installs stored the native provider under the platform name.
            "" | "native" | "gitea" | "forgejo" => Ok(Self::Native),
            other => Self::ALL
                .into_iter()
                .find(|p| p.as_str() == other)
                .ok_or_else(|| Error::UnsupportedProvider(s.to_string())),
        }
    }
}

/// HTTP method used for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `POST` with the payload as body.
    #[default]
    Post,
    /// `PUT` with the payload as body.
    Put,
    /// `GET` with the payload in the `payload` query parameter.
    Get,
}

impl HttpMethod {
    /// Uppercase method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Get => "GET",
        }
    }
}

/// Body encoding for `POST` and `PUT` deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// `application/json`, the payload bytes as-is.
    #[default]
    Json,
    /// `application/x-www-form-urlencoded` with a single `payload` field.
    Form,
}

impl ContentType {
    /// MIME type sent in the `Content-Type` header.
    #[must_use]
    pub const fn mime(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Form => "application/x-www-form-urlencoded",
        }
    }
}

/// The event types a registration subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSubscription {
    /// Every event type.
    #[default]
    All,
    /// Pushes only.
    PushOnly,
    /// An explicit set.
    Chosen(BTreeSet<HookEventType>),
}

impl EventSubscription {
    /// Returns `true` if `event` is subscribed.
    #[must_use]
    pub fn has(&self, event: HookEventType) -> bool {
        match self {
            Self::All => true,
            Self::PushOnly => event == HookEventType::Push,
            Self::Chosen(events) => events.contains(&event),
        }
    }
}

impl FromIterator<HookEventType> for EventSubscription {
    fn from_iter<I: IntoIterator<Item = HookEventType>>(iter: I) -> Self {
        Self::Chosen(iter.into_iter().collect())
    }
}

/// A webhook registration.
///
/// Secrets are held as [`SecretString`] and never appear in `Debug` output.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Registration ID.
    pub id: HookId,
    /// Target URL.
    pub url: String,
    /// Payload format.
    pub provider: ProviderKind,
    /// Delivery method.
    pub http_method: HttpMethod,
    /// Body encoding.
    pub content_type: ContentType,
    /// HMAC signing secret.
    pub secret: Option<SecretString>,
    /// Value for the `Authorization` header.
    pub authorization_header: Option<SecretString>,
    /// Branch filter glob; empty or `*` matches every branch.
    pub branch_filter: String,
    /// Subscribed event types.
    pub events: EventSubscription,
    /// Inactive registrations are never resolved.
    pub active: bool,
    /// Where the registration applies.
    pub scope: RegistrationScope,
    /// Provider-specific settings (channel, chat id, package URL, ...).
    pub meta: serde_json::Value,
}

impl Registration {
    /// Creates an active native registration subscribed to every event.
    #[must_use]
    pub fn new(id: impl Into<HookId>, url: impl Into<String>, scope: RegistrationScope) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            provider: ProviderKind::Native,
            http_method: HttpMethod::Post,
            content_type: ContentType::Json,
            secret: None,
            authorization_header: None,
            branch_filter: String::new(),
            events: EventSubscription::All,
            active: true,
            scope,
            meta: serde_json::Value::Null,
        }
    }

    /// Sets the provider.
    #[must_use]
    pub const fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    /// Sets the branch filter.
    #[must_use]
    pub fn with_branch_filter(mut self, filter: impl Into<String>) -> Self {
        self.branch_filter = filter.into();
        self
    }

    /// Sets the event subscription.
    #[must_use]
    pub fn with_events(mut self, events: EventSubscription) -> Self {
        self.events = events;
        self
    }

    /// Sets the signing secret.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Sets the `Authorization` header value.
    #[must_use]
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization_header = Some(SecretString::from(value.into()));
        self
    }

    /// Sets the delivery method and body encoding.
    #[must_use]
    pub const fn with_http(mut self, method: HttpMethod, content_type: ContentType) -> Self {
        self.http_method = method;
        self.content_type = content_type;
        self
    }

    /// Sets provider metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }

    /// Sets the active flag.
    #[must_use]
    pub const fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Reads a string field from provider metadata.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta
            .get(key)
            .and_then(serde_json::Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("slack", ProviderKind::Slack)]
    #[test_case("MSTeams", ProviderKind::MsTeams)]
    #[test_case("wechatwork", ProviderKind::WechatWork)]
    #[test_case("gitea", ProviderKind::Native)]
    #[test_case("", ProviderKind::Native)]
    fn test_provider_from_str(input: &str, expected: ProviderKind) {
        assert_eq!(input.parse::<ProviderKind>().ok(), Some(expected));
    }

    #[test]
    fn test_unknown_provider_is_unsupported() {
        let err = "carrier-pigeon".parse::<ProviderKind>();
        assert!(matches!(err, Err(Error::UnsupportedProvider(p)) if p == "carrier-pigeon"));
    }

    #[test]
    fn test_provider_serde_uses_config_names() {
        let json = serde_json::to_string(&ProviderKind::MsTeams).unwrap();
        assert_eq!(json, "\"msteams\"");
        let parsed: ProviderKind = serde_json::from_str("\"wechatwork\"").unwrap();
        assert_eq!(parsed, ProviderKind::WechatWork);
    }

    #[test]
    fn test_event_subscription() {
        assert!(EventSubscription::All.has(HookEventType::Wiki));
        assert!(EventSubscription::PushOnly.has(HookEventType::Push));
        assert!(!EventSubscription::PushOnly.has(HookEventType::Create));

        let chosen: EventSubscription = [HookEventType::Issues, HookEventType::Release]
            .into_iter()
            .collect();
        assert!(chosen.has(HookEventType::Release));
        assert!(!chosen.has(HookEventType::Push));
    }

    #[test]
    fn test_registration_debug_redacts_secrets() {
        let reg = Registration::new(1, "https://example.com/hook", RegistrationScope::System)
            .with_secret("super-secret")
            .with_authorization("Bearer token-123");
        let debug = format!("{reg:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("token-123"));
    }

    #[test]
    fn test_meta_str_ignores_empty_values() {
        let reg = Registration::new(1, "https://example.com", RegistrationScope::System)
            .with_meta(serde_json::json!({"channel": "", "username": "bot"}));
        assert_eq!(reg.meta_str("channel"), None);
        assert_eq!(reg.meta_str("username"), Some("bot"));
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(RegistrationScope::Repository { repo_id: 4 }.to_string(), "repository:4");
        assert_eq!(RegistrationScope::Owner { owner_id: 7 }.to_string(), "owner:7");
        assert_eq!(RegistrationScope::System.to_string(), "system");
    }
}
