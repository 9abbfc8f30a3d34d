//! Subscription validation.

use crate::types::Subscription;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static KEBAB_CASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").expect("kebab-case pattern compiles"));

/// Reasons a subscription is rejected before it reaches the registry.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("subscription must contain a session id")]
    MissingSessionId,

    #[error("subscription must contain resource type and resource id")]
    MissingResourceIdentity,

    #[error("resource type must be kebab-case, got {0:?}")]
    InvalidResourceTypeFormat(String),
}

/// Check a subscription. Side-effect free.
pub fn validate(subscription: &Subscription) -> Result<(), ValidationError> {
    if subscription.session_id.as_deref().map_or(true, str::is_empty) {
        return Err(ValidationError::MissingSessionId);
    }

    if subscription.resource_type.is_empty() || subscription.resource_id.is_empty() {
        return Err(ValidationError::MissingResourceIdentity);
    }

    if !is_kebab_case(&subscription.resource_type) {
        return Err(ValidationError::InvalidResourceTypeFormat(
            subscription.resource_type.clone(),
        ));
    }

    Ok(())
}

/// Whether `value` is a kebab-case token such as `res-type` or `order2`.
pub fn is_kebab_case(value: &str) -> bool {
    KEBAB_CASE.is_match(value)
}
