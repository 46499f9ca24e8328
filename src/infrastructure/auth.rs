use crate::domain::auth::{AuthorizationPolicy, Identity};
use std::collections::HashSet;

/// Admin allow-list fixed at startup from configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticAllowList {
    admins: HashSet<Identity>,
}

impl StaticAllowList {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admins: admins
                .into_iter()
                .map(Identity::new)
                .filter(|id| !id.as_str().is_empty())
                .collect(),
        }
    }
}

impl AuthorizationPolicy for StaticAllowList {
    fn is_admin(&self, identity: &Identity) -> bool {
        self.admins.contains(identity)
    }
}
