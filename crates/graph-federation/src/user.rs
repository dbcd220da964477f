use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const UNKNOWN_USER_ID: &str = "UNKNOWN";

/// The requesting user and its two capability sets.
///
/// Auth tokens are opaque strings: the core only ever intersects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub op_auths: BTreeSet<String>,
    #[serde(default)]
    pub data_auths: BTreeSet<String>,
}

impl Default for User {
    fn default() -> Self {
        Self::new(UNKNOWN_USER_ID)
    }
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            op_auths: BTreeSet::new(),
            data_auths: BTreeSet::new(),
        }
    }

    pub fn with_op_auths<I, S>(mut self, auths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.op_auths.extend(auths.into_iter().map(Into::into));
        self
    }

    pub fn with_data_auths<I, S>(mut self, auths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data_auths.extend(auths.into_iter().map(Into::into));
        self
    }

    pub fn has_any_op_auth(&self, auths: &BTreeSet<String>) -> bool {
        contains_any(&self.op_auths, auths)
    }

    pub fn has_any_data_auth(&self, auths: &BTreeSet<String>) -> bool {
        contains_any(&self.data_auths, auths)
    }
}

/// True when the two sets share at least one token. Empty sets never match.
pub fn contains_any(held: &BTreeSet<String>, wanted: &BTreeSet<String>) -> bool {
    wanted.iter().any(|auth| held.contains(auth))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_auths() {
        let user = User::new("alice")
            .with_op_auths(["read"])
            .with_data_auths(["public", "internal"]);

        assert_eq!(user.user_id, "alice");
        assert!(user.op_auths.contains("read"));
        assert_eq!(user.data_auths.len(), 2);
    }

    #[test]
    fn empty_wanted_set_never_matches() {
        let user = User::new("bob").with_data_auths(["public"]);
        assert!(!user.has_any_data_auth(&BTreeSet::new()));
        assert!(user.has_any_data_auth(&BTreeSet::from(["public".to_string()])));
    }
}
