//! Scope-based authorization.
//!
//! Every data route requires `{system}.{service}.{db}.{collection}.{action}`.
//! A granted scope may use `*` for any segment.

use crate::error::{ServerError, ServerResult};
use std::collections::HashSet;
use std::fmt;

/// Action a route performs on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Insert,
    Update,
    Delete,
}

impl Permission {
    pub const fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Insert => "insert",
            Permission::Update => "update",
            Permission::Delete => "delete",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller, attached to the request by the auth middleware.
#[derive(Debug, Clone, Default)]
pub struct Principal {
    pub key_id: String,
    pub scopes: HashSet<String>,
}

impl Principal {
    pub fn new(key_id: impl Into<String>, scopes: HashSet<String>) -> Self {
        Self {
            key_id: key_id.into(),
            scopes,
        }
    }

    pub fn has_scope(&self, required: &str) -> bool {
        self.scopes
            .iter()
            .any(|granted| scope_matches(granted, required))
    }
}

pub fn required_scope(
    system: &str,
    service: &str,
    database: &str,
    collection: &str,
    permission: Permission,
) -> String {
    format!("{system}.{service}.{database}.{collection}.{permission}")
}

/// `*` in the granted scope matches exactly one segment.
fn scope_matches(granted: &str, required: &str) -> bool {
    if granted == required {
        return true;
    }
    if !granted.contains('*') {
        return false;
    }
    let granted: Vec<&str> = granted.split('.').collect();
    let required: Vec<&str> = required.split('.').collect();
    granted.len() == required.len()
        && granted
            .iter()
            .zip(&required)
            .all(|(g, r)| *g == "*" || g == r)
}

/// Fail with 403 unless `principal` holds the scope for this action.
pub fn authorize(
    principal: &Principal,
    system: &str,
    service: &str,
    database: &str,
    collection: &str,
    permission: Permission,
) -> ServerResult<()> {
    let scope = required_scope(system, service, database, collection, permission);
    if principal.has_scope(&scope) {
        Ok(())
    } else {
        tracing::debug!(key_id = %principal.key_id, %scope, "scope check failed");
        Err(ServerError::Forbidden(scope))
    }
}
