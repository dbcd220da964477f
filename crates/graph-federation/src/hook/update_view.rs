use super::GraphHook;
use crate::context::Context;
use crate::error::Result;
use crate::operation::OperationChain;
use crate::user::{contains_any, User};
use crate::view::{View, ViewElementDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Rewrites the view of every view-owning operation for the users it applies
/// to.
///
/// Only operations that own a view are touched, so this is a way to shape
/// results, not a substitute for visibility enforcement inside the stores.
///
/// All fields are optional:
/// - `with_op_auth` / `with_data_auth`: apply to users holding any of these.
/// - `without_op_auth` / `without_data_auth`: never apply to users holding
///   any of these, whatever the `with_*` sets say.
/// - `white_list_element_groups`: only these groups survive, overriding the
///   merge view.
/// - `black_list_element_groups`: these groups are removed, overriding the
///   white list and the merge view.
/// - `view_to_merge`: merged into the operation's view, winning per group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateViewHook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_op_auth: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub without_op_auth: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_data_auth: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub without_data_auth: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_list_element_groups: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_list_element_groups: Option<BTreeSet<String>>,
    /// Kept as serialized JSON so the hook never aliases a live view.
    #[serde(
        default,
        with = "merge_view_json",
        skip_serializing_if = "Option::is_none"
    )]
    view_to_merge: Option<Vec<u8>>,
}

fn auth_set<I, S>(auths: I) -> Option<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Some(auths.into_iter().map(Into::into).collect())
}

impl UpdateViewHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_op_auth<I: IntoIterator<Item = S>, S: Into<String>>(mut self, auths: I) -> Self {
        self.with_op_auth = auth_set(auths);
        self
    }

    pub fn without_op_auth<I: IntoIterator<Item = S>, S: Into<String>>(mut self, auths: I) -> Self {
        self.without_op_auth = auth_set(auths);
        self
    }

    pub fn with_data_auth<I: IntoIterator<Item = S>, S: Into<String>>(mut self, auths: I) -> Self {
        self.with_data_auth = auth_set(auths);
        self
    }

    pub fn without_data_auth<I: IntoIterator<Item = S>, S: Into<String>>(mut self, auths: I) -> Self {
        self.without_data_auth = auth_set(auths);
        self
    }

    pub fn white_list_element_groups<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        groups: I,
    ) -> Self {
        self.white_list_element_groups = auth_set(groups);
        self
    }

    pub fn black_list_element_groups<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        groups: I,
    ) -> Self {
        self.black_list_element_groups = auth_set(groups);
        self
    }

    pub fn view_to_merge(mut self, view: &View) -> Result<Self> {
        self.view_to_merge = Some(view.to_json_bytes()?);
        Ok(self)
    }

    /// A fresh copy of the merge view.
    pub fn merge_view(&self) -> Result<Option<View>> {
        self.view_to_merge
            .as_deref()
            .map(View::from_json_bytes)
            .transpose()
    }

    pub fn apply_to_user(&self, user: &User) -> bool {
        holds_any(&user.data_auths, self.with_data_auth.as_ref(), true)
            && holds_any(&user.op_auths, self.with_op_auth.as_ref(), true)
            && !holds_any(&user.data_auths, self.without_data_auth.as_ref(), false)
            && !holds_any(&user.op_auths, self.without_op_auth.as_ref(), false)
    }

    fn group_lists_configured(&self) -> bool {
        let non_empty = |list: &Option<BTreeSet<String>>| list.as_ref().is_some_and(|l| !l.is_empty());
        non_empty(&self.white_list_element_groups) || non_empty(&self.black_list_element_groups)
    }

    /// Black list is checked after the white list, so it can remove a
    /// white-listed group.
    fn removes_group(&self, group: &str) -> bool {
        let not_white_listed = self
            .white_list_element_groups
            .as_ref()
            .is_some_and(|white| !white.contains(group));
        not_white_listed
            || self
                .black_list_element_groups
                .as_ref()
                .is_some_and(|black| black.contains(group))
    }

    fn filter_groups(
        &self,
        groups: &BTreeMap<String, ViewElementDefinition>,
    ) -> BTreeMap<String, ViewElementDefinition> {
        groups
            .iter()
            .filter(|(group, _)| !self.removes_group(group))
            .map(|(g, d)| (g.clone(), d.clone()))
            .collect()
    }

    fn rewrite(&self, original: Option<View>, merge: Option<&View>) -> View {
        let original = original.map(|mut view| {
            view.expand_global_definitions();
            view
        });

        let mut rewritten = original.clone().unwrap_or_default();
        if let Some(merge) = merge {
            rewritten.merge(merge);
        }

        if let Some(original) = &original {
            if self.group_lists_configured() {
                rewritten.entities = self.filter_groups(&original.entities);
                rewritten.edges = self.filter_groups(&original.edges);
            }
        }
        rewritten
    }
}

/// `configured = None` means the check does not constrain anyone.
fn holds_any(held: &BTreeSet<String>, configured: Option<&BTreeSet<String>>, if_unset: bool) -> bool {
    match configured {
        None => if_unset,
        Some(wanted) => contains_any(held, wanted),
    }
}

impl GraphHook for UpdateViewHook {
    fn name(&self) -> &str {
        "UpdateViewHook"
    }

    fn pre_execute(&self, chain: &mut OperationChain, ctx: &mut Context) -> Result<()> {
        if !self.apply_to_user(ctx.user()) {
            return Ok(());
        }
        let merge = self.merge_view()?;
        let mut rewritten = 0usize;
        for operation in chain.leaves_mut() {
            for slot in operation.views_mut() {
                let view = self.rewrite(slot.take(), merge.as_ref());
                *slot = Some(view);
                rewritten += 1;
            }
        }
        debug!(
            user = %ctx.user().user_id,
            views = rewritten,
            "update view hook rewrote operation views"
        );
        Ok(())
    }
}

mod merge_view_json {
    use crate::view::View;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            None => serializer.serialize_none(),
            Some(bytes) => {
                let view = View::from_json_bytes(bytes).map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&view)
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<View>::deserialize(deserializer)?
            .map(|view| view.to_json_bytes().map_err(serde::de::Error::custom))
            .transpose()
    }
}
