//! Group operations: lazy member loading and member-list editing.
//!
//! [`GroupModel`] narrows a [`ModelRef`] whose behaviour has the
//! [`Group`](crate::model::Group) capability and adds the operations every
//! group supports regardless of where its members come from.
//!
//! ```text
//!   load_members()
//!     ├─ load_metadata()          (catalog members only)
//!     ├─ members loader           (at most one in flight)
//!     └─ always afterwards:
//!          ├─ add group id to every member's known containers
//!          └─ derive member share keys from the group's share keys
//! ```

use std::ops::Deref;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{DeveloperError, Outcome, TerriaError};
use crate::loader::LoadResult;
use crate::model::{upsert_model_from_json, ModelRef, UpsertOptions};
use crate::strata::MEMBERS_TRAIT;

/// A model known to have the group capability.
#[derive(Clone, Debug)]
pub struct GroupModel {
    model: ModelRef,
}

impl GroupModel {
    /// Narrows `model`, returning `None` if it is not a group.
    pub fn new(model: ModelRef) -> Option<Self> {
        model.is_group().then_some(Self { model })
    }

    pub(crate) fn wrap(model: ModelRef) -> Self {
        Self { model }
    }

    /// The underlying model.
    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    /// True while the member loader is running.
    pub fn is_loading_members(&self) -> bool {
        self.model.is_loading_members()
    }

    /// Loads the member list if necessary.
    ///
    /// Safe to call as often as needed: a load in progress is shared and a
    /// completed load is not repeated. Whether or not loading succeeds,
    /// container ids and share keys of the current members are refreshed.
    pub async fn load_members(&self) -> LoadResult {
        let result = self.load_members_inner().await;
        if let Some(id) = self.model.unique_id() {
            self.refresh_known_container_unique_ids(id);
        }
        self.add_share_keys_to_members();
        result
    }

    async fn load_members_inner(&self) -> LoadResult {
        if self.model.is_catalog_member() {
            self.model.load_metadata().await?;
        }
        self.model.load_members_raw().await
    }

    /// Live models for the merged `members` trait.
    ///
    /// Ids hidden by removal markers or not present in the registry are
    /// skipped.
    pub fn member_models(&self) -> Vec<ModelRef> {
        let Some(registry) = self.model.registry() else {
            return Vec::new();
        };
        self.model
            .members()
            .iter()
            .filter_map(|id| registry.get_model_by_id(id))
            .collect()
    }

    fn refresh_known_container_unique_ids(&self, id: &str) {
        for member in self.member_models() {
            member.add_known_container_unique_id(id);
        }
    }

    /// Derives share keys for members whose id embeds this group's id.
    ///
    /// With group `g1` (share key `g0`) and member `g1/item`, the member
    /// gains the share key `g0/item`.
    fn add_share_keys_to_members(&self) {
        let Some(group_id) = self.model.unique_id() else {
            return;
        };
        let Some(registry) = self.model.registry() else {
            return;
        };
        let share_keys = registry.share_keys_of(group_id);
        if share_keys.is_empty() {
            return;
        }
        for member in self.member_models() {
            let Some(member_id) = member.unique_id() else {
                continue;
            };
            if !member_id.contains(group_id) {
                continue;
            }
            for share_key in &share_keys {
                let derived = member_id.replacen(group_id, share_key, 1);
                debug!(member = member_id, share_key = %derived, "Derived member share key");
                registry.add_share_key(member_id, &derived);
            }
        }
    }

    /// Appends `member` to the `members` trait of `stratum`.
    pub fn add(&self, stratum: &str, member: &ModelRef) -> Result<(), DeveloperError> {
        let member_id = member.unique_id().ok_or(DeveloperError::MissingUniqueId {
            operation: "added to a group",
        })?;

        let mut members = match self.model.get_trait(stratum, MEMBERS_TRAIT) {
            Some(Value::Array(members)) => members,
            _ => Vec::new(),
        };
        members.push(Value::String(member_id.to_string()));
        self.model.set_trait(stratum, MEMBERS_TRAIT, Value::Array(members));

        if let Some(group_id) = self.model.unique_id() {
            member.add_known_container_unique_id(group_id);
        }
        Ok(())
    }

    /// Creates or updates members from JSON and adds them to `stratum`.
    ///
    /// Never fails outright: problems are returned in the outcome and every
    /// member that could be resolved is still added.
    pub fn add_members_from_json(&self, stratum: &str, members: &[Value]) -> Outcome<()> {
        let Some(registry) = self.model.registry() else {
            return Outcome::new(
                (),
                Some(TerriaError::from_error("Model registry is no longer available", None)),
            );
        };

        let mut errors = Vec::new();
        for entry in members {
            let member = match entry {
                Value::String(id) => registry.get_model_by_id(id),
                Value::Object(_) => {
                    let (member, error) = upsert_model_from_json(
                        &registry,
                        self.model.unique_id(),
                        stratum,
                        entry,
                        UpsertOptions::default(),
                    )
                    .into_parts();
                    errors.extend(error);
                    member
                }
                other => {
                    errors.push(TerriaError::from_error(
                        format!("Invalid member `{}`", other),
                        None,
                    ));
                    None
                }
            };
            if let Some(member) = member {
                if let Err(e) = self.add(stratum, &member) {
                    errors.push(e.into());
                }
            }
        }

        Outcome::new(
            (),
            TerriaError::combine(
                errors,
                format!(
                    "Failed to add members from JSON for model `{}`",
                    self.model.display_name()
                ),
            ),
        )
    }

    /// Moves `member` to `new_index` within the merged member list and
    /// writes the result into `stratum`.
    pub fn move_member_to_index(
        &self,
        stratum: &str,
        member: &ModelRef,
        new_index: usize,
    ) -> Result<(), DeveloperError> {
        let member_id = member.unique_id().ok_or(DeveloperError::MissingUniqueId {
            operation: "reordered",
        })?;
        let mut members = self.model.members();
        if new_index >= members.len() {
            return Err(DeveloperError::InvalidIndex {
                index: new_index,
                len: members.len(),
            });
        }
        let from = members
            .iter()
            .position(|id| id == member_id)
            .ok_or_else(|| DeveloperError::MemberNotFound {
                group: self.model.unique_id().unwrap_or_default().to_string(),
                member: member_id.to_string(),
            })?;

        let id = members.remove(from);
        members.insert(new_index, id);
        self.model.set_trait(
            stratum,
            MEMBERS_TRAIT,
            Value::Array(members.into_iter().map(Value::String).collect()),
        );
        Ok(())
    }

    /// Removes `member` from the `members` trait of `stratum`, if present.
    pub fn remove(&self, stratum: &str, member: &ModelRef) {
        let Some(member_id) = member.unique_id() else {
            return;
        };
        if let Some(Value::Array(mut members)) = self.model.get_trait(stratum, MEMBERS_TRAIT) {
            if let Some(index) = members.iter().position(|m| m.as_str() == Some(member_id)) {
                members.remove(index);
                self.model.set_trait(stratum, MEMBERS_TRAIT, Value::Array(members));
            }
        }
    }

    /// Flips `isOpen` in `stratum`.
    pub fn toggle_open(&self, stratum: &str) {
        let open = !self.model.is_open();
        self.model.set_trait(stratum, "isOpen", Value::Bool(open));
    }

    /// Sets `isOpen` in `stratum` and loads members when opening.
    pub async fn open(&self, is_open: bool, stratum: &str) -> LoadResult {
        self.model.set_trait(stratum, "isOpen", Value::Bool(is_open));
        if is_open {
            self.load_members().await?;
        }
        Ok(())
    }
}

impl Deref for GroupModel {
    type Target = ModelRef;

    fn deref(&self) -> &ModelRef {
        &self.model
    }
}

impl From<GroupModel> for ModelRef {
    fn from(group: GroupModel) -> Self {
        Arc::clone(&group.model)
    }
}
