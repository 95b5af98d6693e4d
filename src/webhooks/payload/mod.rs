//! Payload shaping.
//!
//! A [`ProviderRegistry`] maps each [`ProviderKind`] to its [`Transform`]. The
//! registry is built once and injected into the [`PayloadShaper`]; a provider
//! missing from the registry fails closed with
//! [`Error::UnsupportedProvider`].

mod providers;
mod summary;

use crate::models::{HookEventType, HookPayload, HttpMethod, ProviderKind, Registration, TaskId};
use crate::{Error, Result};
use std::collections::HashMap;

/// Signature of a provider transform.
pub type TransformFn =
    fn(&HookPayload, HookEventType, &serde_json::Value) -> Result<serde_json::Value>;

/// How a provider's payload is produced.
#[derive(Clone, Copy)]
pub enum Transform {
    /// The generic payload is sent unchanged.
    PassThrough,
    /// The generic payload is converted to the provider's JSON.
    Convert(TransformFn),
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PassThrough => f.write_str("PassThrough"),
            Self::Convert(_) => f.write_str("Convert(..)"),
        }
    }
}

/// Immutable provider → transform table.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    transforms: HashMap<ProviderKind, Transform>,
}

impl ProviderRegistry {
    /// A registry with no providers. Every shape call fails.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every built-in provider.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with(ProviderKind::Native, Transform::PassThrough)
            .with(ProviderKind::Gogs, Transform::PassThrough)
            .with(ProviderKind::Slack, Transform::Convert(providers::slack))
            .with(ProviderKind::Discord, Transform::Convert(providers::discord))
            .with(ProviderKind::Dingtalk, Transform::Convert(providers::dingtalk))
            .with(ProviderKind::Telegram, Transform::Convert(providers::telegram))
            .with(ProviderKind::MsTeams, Transform::Convert(providers::msteams))
            .with(ProviderKind::Feishu, Transform::Convert(providers::feishu))
            .with(ProviderKind::Matrix, Transform::Convert(providers::matrix))
            .with(ProviderKind::WechatWork, Transform::Convert(providers::wechatwork))
            .with(ProviderKind::Packagist, Transform::Convert(providers::packagist))
    }

    /// Returns the registry with `provider` mapped to `transform`.
    #[must_use]
    pub fn with(mut self, provider: ProviderKind, transform: Transform) -> Self {
        self.transforms.insert(provider, transform);
        self
    }

    /// Looks up a provider's transform.
    #[must_use]
    pub fn get(&self, provider: ProviderKind) -> Option<Transform> {
        self.transforms.get(&provider).copied()
    }

    /// Returns `true` if the provider has a transform.
    #[must_use]
    pub fn supports(&self, provider: ProviderKind) -> bool {
        self.transforms.contains_key(&provider)
    }
}

/// Endpoint and method a task is delivered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    /// Request URL.
    pub url: String,
    /// HTTP method.
    pub method: HttpMethod,
}

/// Resolves where `task_id` is sent for `registration`.
///
/// Matrix registrations with a `room_id` and Packagist registrations with API
/// credentials derive their endpoint from metadata; every other registration
/// uses its URL and method unchanged.
#[must_use]
pub fn delivery_target(registration: &Registration, task_id: TaskId) -> DeliveryTarget {
    let derived = match registration.provider {
        ProviderKind::Matrix => providers::matrix_target(registration, task_id),
        ProviderKind::Packagist => providers::packagist_target(registration),
        _ => None,
    };
    derived.unwrap_or_else(|| DeliveryTarget {
        url: registration.url.clone(),
        method: registration.http_method,
    })
}

/// Turns generic payloads into provider wire payloads.
#[derive(Debug, Clone)]
pub struct PayloadShaper {
    registry: ProviderRegistry,
}

impl Default for PayloadShaper {
    fn default() -> Self {
        Self::new(ProviderRegistry::standard())
    }
}

impl PayloadShaper {
    /// Creates a shaper over `registry`.
    #[must_use]
    pub const fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// The registry in use.
    #[must_use]
    pub const fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Shapes `payload` for `registration`'s provider and serialises it.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedProvider`] if the provider has no transform
    /// - [`Error::PayloadShaping`] if the provider metadata is missing or invalid
    pub fn shape(
        &self,
        payload: &HookPayload,
        event: HookEventType,
        registration: &Registration,
    ) -> Result<Vec<u8>> {
        let transform = self
            .registry
            .get(registration.provider)
            .ok_or_else(|| Error::UnsupportedProvider(registration.provider.to_string()))?;

        match transform {
            Transform::PassThrough => payload.to_json_bytes(),
            Transform::Convert(convert) => {
                let value = convert(payload, event, &registration.meta)?;
                serde_json::to_vec(&value).map_err(|e| Error::PayloadShaping {
                    provider: registration.provider.to_string(),
                    cause: e.to_string(),
                })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegistrationScope, RepositoryRef};

    fn payload() -> HookPayload {
        HookPayload::sample_push(RepositoryRef {
            id: 1,
            owner_id: 2,
            name: "widgets".to_string(),
            full_name: "acme/widgets".to_string(),
            html_url: "https://git.example.com/acme/widgets".to_string(),
        })
    }

    fn registration(provider: ProviderKind) -> Registration {
        Registration::new(1, "https://example.com", RegistrationScope::System)
            .with_provider(provider)
    }

    #[test]
    fn test_standard_registry_covers_every_provider() {
        let registry = ProviderRegistry::standard();
        for provider in ProviderKind::ALL {
            assert!(registry.supports(provider), "{provider} missing");
        }
    }

    #[test]
    fn test_native_passes_payload_through() {
        let shaper = PayloadShaper::default();
        let payload = payload();
        let body = shaper
            .shape(&payload, HookEventType::Push, &registration(ProviderKind::Native))
            .unwrap();
        assert_eq!(body, payload.to_json_bytes().unwrap());
    }

    #[test]
    fn test_missing_provider_fails_closed() {
        let shaper = PayloadShaper::new(
            ProviderRegistry::empty().with(ProviderKind::Native, Transform::PassThrough),
        );
        let err = shaper
            .shape(&payload(), HookEventType::Push, &registration(ProviderKind::Discord))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedProvider(ref p) if p == "discord"));
    }

    #[test]
    fn test_converted_payload_is_provider_json() {
        let shaper = PayloadShaper::default();
        let body = shaper
            .shape(&payload(), HookEventType::Push, &registration(ProviderKind::Feishu))
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["msg_type"], "text");
    }

    #[test]
    fn test_fake_provider_set() {
        fn fixed(
            _: &HookPayload,
            event: HookEventType,
            _: &serde_json::Value,
        ) -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "event": event.as_str() }))
        }

        let shaper = PayloadShaper::new(
            ProviderRegistry::empty().with(ProviderKind::Slack, Transform::Convert(fixed)),
        );
        let body = shaper
            .shape(&payload(), HookEventType::Push, &registration(ProviderKind::Slack))
            .unwrap();
        assert_eq!(body, br#"{"event":"push"}"#);
    }
}
