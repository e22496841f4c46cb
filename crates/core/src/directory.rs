//! Member directory: who the users are and what their organizations are
//! called. Membership and scope resolution live outside this engine; the
//! directory only answers lookups.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{OrgId, Result, UserId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub login_id: String,
    pub email: String,
    pub organization_id: Option<OrgId>,
    pub group_name: String,
    pub role: String,
}

impl MemberProfile {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Profiles for the given users. Unknown users are absent from the map.
    async fn profiles(&self, users: &[UserId]) -> Result<HashMap<UserId, MemberProfile>>;

    /// Display names for the given organizations.
    async fn organization_names(&self, orgs: &[OrgId]) -> Result<HashMap<OrgId, String>>;
}

/// In-memory directory, filled by the embedding application or by tests.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    profiles: RwLock<HashMap<UserId, MemberProfile>>,
    organizations: RwLock<HashMap<OrgId, String>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: MemberProfile) {
        self.profiles.write().insert(profile.user_id, profile);
    }

    pub fn insert_organization(&self, id: OrgId, name: impl Into<String>) {
        self.organizations.write().insert(id, name.into());
    }
}

#[async_trait]
impl MemberDirectory for StaticDirectory {
    async fn profiles(&self, users: &[UserId]) -> Result<HashMap<UserId, MemberProfile>> {
        let profiles = self.profiles.read();
        Ok(users
            .iter()
            .filter_map(|id| profiles.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn organization_names(&self, orgs: &[OrgId]) -> Result<HashMap<OrgId, String>> {
        let names = self.organizations.read();
        Ok(orgs
            .iter()
            .filter_map(|id| names.get(id).map(|n| (*id, n.clone())))
            .collect())
    }
}
