use serde::{Deserialize, Serialize};
use std::fmt;

/// The caller on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn anonymous() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<anonymous>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Decides which callers may run administrative operations.
pub trait AuthorizationPolicy: Send + Sync {
    fn is_admin(&self, identity: &Identity) -> bool;
}

pub type AuthorizationPolicyBox = Box<dyn AuthorizationPolicy>;
