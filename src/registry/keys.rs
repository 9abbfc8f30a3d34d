//! Key layout of the distributed backend.
//!
//! Operators inspect these keys directly, so the templates are a
//! compatibility surface:
//!
//! ```text
//! subscription|{sessionId}|{resourceType}|{resourceId}   primary record (JSON, with TTL)
//! sessionIdSub|{sessionId}                              set of primary keys for a session
//! resTypeResIdSub|{resourceType}|{resourceId}           set of primary keys for a resource
//! resTypeResIdSnap|{resourceType}|{resourceId}          cached snapshot (with TTL)
//! ```

use crate::types::Subscription;

pub const SUBSCRIPTION_PREFIX: &str = "subscription|";
pub const SESSION_SET_PREFIX: &str = "sessionIdSub|";
pub const RESOURCE_SET_PREFIX: &str = "resTypeResIdSub|";
pub const SNAPSHOT_PREFIX: &str = "resTypeResIdSnap|";

pub const SUBSCRIPTION_PATTERN: &str = "subscription|*";
pub const SESSION_SET_PATTERN: &str = "sessionIdSub|*";
pub const RESOURCE_SET_PATTERN: &str = "resTypeResIdSub|*";

const PIPE: char = '|';

/// Primary record key, or `None` for subscriptions without a session.
pub fn subscription_key(subscription: &Subscription) -> Option<String> {
    let session_id = subscription.session_id.as_deref()?;
    Some(format!(
        "{SUBSCRIPTION_PREFIX}{session_id}{PIPE}{}{PIPE}{}",
        subscription.resource_type, subscription.resource_id
    ))
}

pub fn session_set_key(session_id: &str) -> String {
    format!("{SESSION_SET_PREFIX}{session_id}")
}

pub fn resource_set_key(resource_type: &str, resource_id: &str) -> String {
    format!("{RESOURCE_SET_PREFIX}{resource_type}{PIPE}{resource_id}")
}

pub fn snapshot_key(resource_type: &str, resource_id: &str) -> String {
    format!("{SNAPSHOT_PREFIX}{resource_type}{PIPE}{resource_id}")
}

/// Pattern matching every resource set of one resource type.
///
/// The type is matched literally; glob metacharacters in it are escaped.
pub fn resource_type_pattern(resource_type: &str) -> String {
    format!("{RESOURCE_SET_PREFIX}{}{PIPE}*", escape_glob(resource_type))
}

/// Escape `*`, `?`, `[`, `]` and `\` for SCAN MATCH patterns.
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Resource set that references a primary key owned by `session_id`.
///
/// Resource types never contain a pipe, so everything after the first pipe
/// following the session segment is the resource id.
pub fn resource_set_for(session_id: &str, subscription_key: &str) -> Option<String> {
    let rest = subscription_key
        .strip_prefix(SUBSCRIPTION_PREFIX)?
        .strip_prefix(session_id)?
        .strip_prefix(PIPE)?;
    let (resource_type, resource_id) = rest.split_once(PIPE)?;
    if resource_type.is_empty() {
        return None;
    }
    Some(resource_set_key(resource_type, resource_id))
}
