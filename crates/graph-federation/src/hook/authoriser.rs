use super::GraphHook;
use crate::context::Context;
use crate::error::{GraphError, Result};
use crate::operation::{Operation, OperationChain};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Requires op auths per operation name.
///
/// A user must hold every auth listed for an operation to run it. The chain
/// itself is checked under `"OperationChain"`, and every hop of a walk counts
/// as a `GetElements`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationAuthoriser {
    #[serde(default)]
    pub auths: BTreeMap<String, BTreeSet<String>>,
}

impl OperationAuthoriser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require<I, S>(mut self, operation: impl Into<String>, auths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auths
            .entry(operation.into())
            .or_default()
            .extend(auths.into_iter().map(Into::into));
        self
    }

    fn missing_auths<'a>(&'a self, operation: &str, held: &BTreeSet<String>) -> Vec<&'a str> {
        self.auths
            .get(operation)
            .map(|required| {
                required
                    .iter()
                    .filter(|auth| !held.contains(*auth))
                    .map(String::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn checked_names(chain: &OperationChain) -> Vec<&'static str> {
    let mut names = vec!["OperationChain"];
    for operation in chain.flatten() {
        names.push(operation.name());
        if let Operation::GetWalks(walk) = &operation {
            names.extend(walk.hops.iter().map(|_| "GetElements"));
        }
    }
    names
}

impl GraphHook for OperationAuthoriser {
    fn name(&self) -> &str {
        "OperationAuthoriser"
    }

    fn pre_execute(&self, chain: &mut OperationChain, ctx: &mut Context) -> Result<()> {
        let user = ctx.user();
        for name in checked_names(chain) {
            let missing = self.missing_auths(name, &user.op_auths);
            if !missing.is_empty() {
                warn!(user = %user.user_id, operation = name, ?missing, "operation not authorised");
                return Err(GraphError::hook_rejected(
                    self.name(),
                    format!("user {} is not authorised to run {name}", user.user_id),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{GetElements, GetWalks};
    use crate::user::User;

    fn check(hook: &OperationAuthoriser, user: User, mut chain: OperationChain) -> Result<()> {
        hook.pre_execute(&mut chain, &mut Context::new(user))
    }

    #[test]
    fn every_listed_auth_is_required() {
        let hook = OperationAuthoriser::new().require("Count", ["reader", "counter"]);
        let chain = OperationChain::first(GetElements::new().seeds(["a"])).then(Operation::Count);

        let partial = User::new("u").with_op_auths(["reader"]);
        let err = check(&hook, partial, chain.clone()).unwrap_err();
        assert!(matches!(err, GraphError::HookRejected { .. }));

        let full = User::new("u").with_op_auths(["reader", "counter"]);
        assert!(check(&hook, full, chain).is_ok());
    }

    #[test]
    fn walk_hops_need_get_elements_auth() {
        let hook = OperationAuthoriser::new().require("GetElements", ["reader"]);
        let chain = OperationChain::first(GetWalks::new().seeds(["a"]).hop(GetElements::new()));

        assert!(check(&hook, User::new("u"), chain.clone()).is_err());
        assert!(check(&hook, User::new("u").with_op_auths(["reader"]), chain).is_ok());
    }

    #[test]
    fn unlisted_operations_are_open() {
        let hook = OperationAuthoriser::new().require("GetAllElements", ["admin"]);
        let chain = OperationChain::first(GetElements::new().seeds(["a"]));
        assert!(check(&hook, User::default(), chain).is_ok());
    }
}
