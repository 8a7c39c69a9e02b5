//! Credential rotation policy.
//!
//! An ordered rule list, each rule returning early: base ordering, mode
//! filter, round-robin by last use, then availability.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{AgentError, AgentResult};
use crate::types::{AuthMode, AuthProfileStore, Credential};

/// An operator-configured profile: which provider it's meant for, and
/// optionally which auth mode it must present as.
#[derive(Debug, Clone)]
pub struct ConfiguredProfile {
    pub provider: String,
    pub mode: Option<AuthMode>,
}

/// Operator configuration the resolver consults alongside the store: a
/// fallback profile order per provider, and per-profile mode constraints.
#[derive(Debug, Clone, Default)]
pub struct AuthResolverConfig {
    pub order: Option<HashMap<String, Vec<String>>>,
    pub profiles: HashMap<String, ConfiguredProfile>,
}

fn credential_mode(credential: &Credential) -> AuthMode {
    match credential {
        Credential::ApiKey { .. } => AuthMode::ApiKey,
        Credential::Token { .. } => AuthMode::Token,
    }
}

fn mode_allowed(configured: AuthMode, actual: AuthMode) -> bool {
    configured == actual || (configured == AuthMode::Oauth && actual == AuthMode::Token)
}

fn base_ordering(provider: &str, store: &AuthProfileStore, config: &AuthResolverConfig) -> Vec<String> {
    if let Some(order) = store.order.as_ref().and_then(|o| o.get(provider)) {
        return order.clone();
    }
    if let Some(order) = config.order.as_ref().and_then(|o| o.get(provider)) {
        return order.clone();
    }
    store.profiles.iter().filter(|(_, c)| c.provider() == provider).map(|(id, _)| id.clone()).collect()
}

fn passes_mode_filter(id: &str, provider: &str, store: &AuthProfileStore, config: &AuthResolverConfig) -> bool {
    let Some(credential) = store.profiles.get(id) else { return false };
    if credential.provider() != provider {
        return false;
    }
    match config.profiles.get(id) {
        Some(configured) => {
            if configured.provider != provider {
                return false;
            }
            match configured.mode {
                Some(mode) => mode_allowed(mode, credential_mode(credential)),
                None => true,
            }
        }
        None => true,
    }
}

fn last_used(id: &str, store: &AuthProfileStore) -> i64 {
    store.usage_stats.as_ref().and_then(|stats| stats.get(id)).and_then(|s| s.last_used).unwrap_or(0)
}

fn is_unavailable(id: &str, store: &AuthProfileStore, now: i64) -> bool {
    let Some(stats) = store.usage_stats.as_ref().and_then(|stats| stats.get(id)) else { return false };
    stats.cooldown_until.is_some_and(|t| now < t) || stats.disabled_until.is_some_and(|t| now < t)
}

/// The ordered list of profile ids to try for `provider`, per the
/// precedence: store order / config order / all matching profiles, then
/// round-robin by least-recently-used, then available profiles before
/// unavailable ones.
#[must_use]
pub fn preference_list(provider: &str, store: &AuthProfileStore, config: &AuthResolverConfig) -> Vec<String> {
    let now = crate::types::now_millis();
    let mut ids: Vec<String> =
        base_ordering(provider, store, config).into_iter().filter(|id| passes_mode_filter(id, provider, store, config)).collect();
    ids.sort_by_key(|id| last_used(id, store));
    ids.sort_by_key(|id| is_unavailable(id, store, now));
    ids
}

/// A credential successfully resolved from a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfileKey {
    pub api_key: String,
    pub provider: String,
    pub profile_id: String,
}

/// Resolve usable credentials from a single profile, honoring token expiry
/// and rejecting blank secrets.
#[must_use]
pub fn resolve_api_key_for_profile(store: &AuthProfileStore, id: &str) -> Option<ResolvedProfileKey> {
    let now = crate::types::now_millis();
    match store.profiles.get(id)? {
        Credential::ApiKey { provider, key } => {
            let trimmed = key.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(ResolvedProfileKey { api_key: trimmed.to_string(), provider: provider.clone(), profile_id: id.to_string() })
        }
        Credential::Token { provider, token, expires } => {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                return None;
            }
            if expires.is_some_and(|exp| exp <= now) {
                return None;
            }
            Some(ResolvedProfileKey { api_key: trimmed.to_string(), provider: provider.clone(), profile_id: id.to_string() })
        }
    }
}

/// Resolve auth for `provider`: try the preference list in order, falling
/// back to the AWS SDK default-credential chain for `amazon-bedrock`, and
/// otherwise failing with a diagnostic naming the store path.
pub fn resolve_api_key_for_provider(
    provider: &str,
    store: &AuthProfileStore,
    config: &AuthResolverConfig,
    store_path: &Path,
) -> AgentResult<crate::types::ResolvedProviderAuth> {
    for id in preference_list(provider, store, config) {
        if let Some(resolved) = resolve_api_key_for_profile(store, &id) {
            let mode = match store.profiles.get(&id) {
                Some(Credential::ApiKey { .. }) => AuthMode::ApiKey,
                Some(Credential::Token { .. }) | None => AuthMode::Token,
            };
            return Ok(crate::types::ResolvedProviderAuth {
                mode,
                api_key: Some(resolved.api_key),
                profile_id: Some(resolved.profile_id),
                source: format!("profile:{id}"),
            });
        }
    }

    if provider == "amazon-bedrock" {
        return Ok(resolve_aws_sdk_chain());
    }

    Err(AgentError::AuthResolutionFailed {
        provider: provider.to_string(),
        message: format!(
            "no usable profile for provider '{provider}' in {}; add one with the auth-profile config command",
            store_path.display()
        ),
    })
}

/// Inspect the AWS env chain in precedence order: bearer token, access/
/// secret key pair, named profile, then the SDK's own default chain.
fn resolve_aws_sdk_chain() -> crate::types::ResolvedProviderAuth {
    let source = if std::env::var("AWS_BEARER_TOKEN_BEDROCK").is_ok() {
        "aws-bearer-token"
    } else if std::env::var("AWS_ACCESS_KEY_ID").is_ok() && std::env::var("AWS_SECRET_ACCESS_KEY").is_ok() {
        "aws-access-secret-pair"
    } else if std::env::var("AWS_PROFILE").is_ok() {
        "aws-named-profile"
    } else {
        "aws-sdk-default-chain"
    };
    crate::types::ResolvedProviderAuth { mode: AuthMode::AwsSdk, api_key: None, profile_id: None, source: source.to_string() }
}
