//! `[[registrations]]` entries in the config file.

use crate::models::{
    ContentType, EventSubscription, HookEventType, HttpMethod, ProviderKind, Registration,
    RegistrationScope,
};
use crate::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // literal pattern
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex")
});

/// Replaces every `${VAR}` in `input` with `lookup(VAR)`.
///
/// Unset variables expand to an empty string and are logged.
pub fn expand_env_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            lookup(name).unwrap_or_else(|| {
                tracing::warn!(variable = name, "Unset environment variable in config");
                String::new()
            })
        })
        .into_owned()
}

/// `events` accepts a mode name or a list of event types.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EventsField {
    /// `"all"` or `"push_only"`.
    Mode(String),
    /// Explicit event types.
    List(Vec<String>),
}

/// One `[[registrations]]` table.
#[derive(Debug, Deserialize)]
pub struct ConfigFileRegistration {
    /// Registration ID.
    pub id: i64,
    /// Target URL.
    pub url: String,
    /// Provider name.
    pub provider: Option<String>,
    /// `POST`, `PUT` or `GET`.
    pub http_method: Option<String>,
    /// `json` or `form`.
    pub content_type: Option<String>,
    /// Signing secret, `${VAR}` expanded.
    pub secret: Option<String>,
    /// `Authorization` header value, `${VAR}` expanded.
    pub authorization_header: Option<String>,
    /// Branch glob.
    pub branch_filter: Option<String>,
    /// Event subscription.
    pub events: Option<EventsField>,
    /// Active flag.
    pub active: Option<bool>,
    /// Scope.
    pub scope: RegistrationScope,
    /// Provider metadata.
    pub meta: Option<serde_json::Value>,
}

impl ConfigFileRegistration {
    /// Builds the registration, resolving `${VAR}` with `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-HTTP URL or an unknown provider, method,
    /// content type or event.
    pub fn into_registration(
        self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Registration> {
        let url = expand_env_vars(&self.url, &lookup);
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::InvalidInput(format!(
                "registration {} url must be http or https: {url}",
                self.id
            )));
        }

        let provider = self
            .provider
            .as_deref()
            .map_or(Ok(ProviderKind::Native), str::parse)?;
        let http_method = self
            .http_method
            .as_deref()
            .map_or(Ok(HttpMethod::Post), parse_method)?;
        let content_type = self
            .content_type
            .as_deref()
            .map_or(Ok(ContentType::Json), parse_content_type)?;
        let events = self.events.map_or(Ok(EventSubscription::All), parse_events)?;

        let mut registration = Registration::new(self.id, url, self.scope)
            .with_provider(provider)
            .with_http(http_method, content_type)
            .with_events(events)
            .with_branch_filter(self.branch_filter.unwrap_or_default())
            .with_active(self.active.unwrap_or(true))
            .with_meta(self.meta.unwrap_or_default());

        if let Some(secret) = self.secret {
            let secret = expand_env_vars(&secret, &lookup);
            if !secret.is_empty() {
                registration = registration.with_secret(secret);
            }
        }
        if let Some(header) = self.authorization_header {
            let header = expand_env_vars(&header, &lookup);
            if !header.is_empty() {
                registration = registration.with_authorization(header);
            }
        }

        Ok(registration)
    }
}

fn parse_method(value: &str) -> Result<HttpMethod> {
    match value.trim().to_uppercase().as_str() {
        "POST" => Ok(HttpMethod::Post),
        "PUT" => Ok(HttpMethod::Put),
        "GET" => Ok(HttpMethod::Get),
        _ => Err(Error::InvalidInput(format!("Unsupported http_method: {value}"))),
    }
}

fn parse_content_type(value: &str) -> Result<ContentType> {
    match value.trim().to_lowercase().as_str() {
        "json" | "application/json" => Ok(ContentType::Json),
        "form" | "application/x-www-form-urlencoded" => Ok(ContentType::Form),
        _ => Err(Error::InvalidInput(format!("Unsupported content_type: {value}"))),
    }
}

fn parse_events(field: EventsField) -> Result<EventSubscription> {
    match field {
        EventsField::Mode(mode) => match mode.trim().to_lowercase().as_str() {
            "all" | "*" => Ok(EventSubscription::All),
            "push_only" | "push-only" => Ok(EventSubscription::PushOnly),
            _ => Err(Error::InvalidInput(format!("Unknown events mode: {mode}"))),
        },
        EventsField::List(events) => events
            .iter()
            .map(|event| event.parse::<HookEventType>())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use test_case::test_case;

    fn entry(toml_text: &str) -> ConfigFileRegistration {
        toml::from_str(toml_text).unwrap()
    }

    #[test_case("plain", "plain"; "no references")]
    #[test_case("${TOKEN}", "abc"; "whole value")]
    #[test_case("Bearer ${TOKEN}", "Bearer abc"; "embedded")]
    #[test_case("${MISSING}-x", "-x"; "unset variable")]
    #[test_case("$TOKEN", "$TOKEN"; "bare dollar untouched")]
    fn test_expand_env_vars(input: &str, expected: &str) {
        let lookup = |name: &str| (name == "TOKEN").then(|| "abc".to_string());
        assert_eq!(expand_env_vars(input, lookup), expected);
    }

    #[test]
    fn test_minimal_entry_uses_defaults() {
        let reg = entry(
            r#"
            id = 3
            url = "https://example.com/hook"
            scope = { type = "repository", repo_id = 1 }
            "#,
        )
        .into_registration(|_| None)
        .unwrap();

        assert_eq!(reg.provider, ProviderKind::Native);
        assert_eq!(reg.http_method, HttpMethod::Post);
        assert_eq!(reg.content_type, ContentType::Json);
        assert_eq!(reg.events, EventSubscription::All);
        assert!(reg.active);
        assert!(reg.secret.is_none());
        assert!(reg.meta.is_null());
    }

    #[test]
    fn test_form_get_and_authorization() {
        let reg = entry(
            r#"
            id = 4
            url = "http://internal:8080/hook"
            http_method = "get"
            content_type = "form"
            authorization_header = "Bearer ${TOKEN}"
            scope = { type = "system" }
            "#,
        )
        .into_registration(|_| Some("t0k".to_string()))
        .unwrap();

        assert_eq!(reg.http_method, HttpMethod::Get);
        assert_eq!(reg.content_type, ContentType::Form);
        assert_eq!(
            reg.authorization_header.as_ref().unwrap().expose_secret(),
            "Bearer t0k"
        );
    }

    #[test]
    fn test_empty_expanded_secret_is_dropped() {
        let reg = entry(
            r#"
            id = 5
            url = "https://example.com"
            secret = "${UNSET}"
            scope = { type = "system" }
            "#,
        )
        .into_registration(|_| None)
        .unwrap();
        assert!(reg.secret.is_none());
    }

    #[test_case(r#"provider = "carrier-pigeon""#; "unknown provider")]
    #[test_case(r#"http_method = "PATCH""#; "unknown method")]
    #[test_case(r#"events = ["teleport"]"#; "unknown event")]
    #[test_case(r#"events = "some""#; "unknown mode")]
    fn test_rejects_bad_fields(extra: &str) {
        let text = format!(
            "id = 9\nurl = \"https://example.com\"\n{extra}\nscope = {{ type = \"system\" }}\n"
        );
        assert!(entry(&text).into_registration(|_| None).is_err());
    }
}
