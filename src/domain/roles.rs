//! Role resolution and the gate in front of admin-only views and actions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Account role. Anything the backend sends that is not `admin` reads as `user`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    #[serde(other)]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of looking up the current identity's role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoleResolution {
    #[default]
    Pending,
    Resolved(Role),
    Failed,
}

impl RoleResolution {
    /// Role to act on right now. Pending and failed lookups get the lowest privilege.
    pub fn effective_role(&self) -> Role {
        match self {
            RoleResolution::Resolved(role) => *role,
            RoleResolution::Pending | RoleResolution::Failed => Role::User,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, RoleResolution::Pending)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Redirect {
    Login,
    Forbidden,
}

impl Redirect {
    pub fn path(&self) -> &'static str {
        match self {
            Redirect::Login => "/login",
            Redirect::Forbidden => "/forbidden",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Keep privileged content hidden until the role is known.
    Wait,
    Allow,
    Redirect(Redirect),
}

pub struct RoleGate;

impl RoleGate {
    /// Decide what an admin-only view may render.
    pub fn check(resolution: RoleResolution, signed_in: bool) -> Access {
        if !signed_in {
            return Access::Redirect(Redirect::Login);
        }
        match resolution {
            RoleResolution::Pending => Access::Wait,
            RoleResolution::Resolved(Role::Admin) => Access::Allow,
            RoleResolution::Resolved(Role::User) | RoleResolution::Failed => {
                Access::Redirect(Redirect::Forbidden)
            }
        }
    }

    /// Same decision for actions: anything other than a settled admin role is refused.
    pub fn require_admin(resolution: RoleResolution) -> Result<(), RoleError> {
        match resolution {
            RoleResolution::Resolved(Role::Admin) => Ok(()),
            RoleResolution::Pending => Err(RoleError::Unresolved),
            RoleResolution::Resolved(Role::User) | RoleResolution::Failed => {
                Err(RoleError::AdminRequired)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    #[error("role is still being resolved")]
    Unresolved,
    #[error("You have no permission to access this resource")]
    AdminRequired,
}

/// Only an existing admin promotes or demotes accounts.
pub fn authorize_role_change(actor: RoleResolution, new_role: Role) -> Result<Role, RoleError> {
    RoleGate::require_admin(actor)?;
    Ok(new_role)
}
