use serde::{Deserialize, Serialize};

use crate::client::Backend;
use crate::error::PinsError;

pub const HAS_ROLE_FUNCTION: &str = "has_role";

/// Roles stored server-side for a member.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Finance,
    Support,
    Member,
}

#[derive(Debug, Serialize)]
struct HasRoleParams<'a> {
    #[serde(rename = "_user_id")]
    user_id: &'a str,
    #[serde(rename = "_role")]
    role: MemberRole,
}

/// Server-validated role checks. Obtained from [`Backend::roles`].
///
/// The answer always comes from the database; nothing is cached here, so callers decide how
/// long a result stays valid.
pub struct RolesHandle<'a> {
    client: &'a Backend,
}

impl<'a> RolesHandle<'a> {
    pub(crate) fn new(client: &'a Backend) -> Self {
        RolesHandle { client }
    }

    /// Returns whether `user_id` holds `role`.
    pub async fn has_role(&self, user_id: &str, role: MemberRole) -> Result<bool, PinsError> {
        if user_id.trim().is_empty() {
            return Err(PinsError::InvalidInput(
                "user_id cannot be empty for has_role.".to_string(),
            ));
        }
        let allowed: bool = self
            .client
            .rpc()
            .call(HAS_ROLE_FUNCTION, &HasRoleParams { user_id, role })
            .await?;
        log::debug!("Role check {:?} for {}: {}", role, user_id, allowed);
        Ok(allowed)
    }
}
