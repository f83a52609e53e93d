//! Per-session identity and role, passed explicitly to the flows that need it.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::entities::{AuthProvider, User};
use super::lifecycle::Actor;
use super::roles::{Access, Redirect, Role, RoleGate, RoleResolution};

/// The signed-in identity as reported by the identity provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub provider: AuthProvider,
}

impl AuthUser {
    /// Account record saved to the backend after sign-in or sign-up.
    pub fn to_user(&self) -> User {
        User {
            id: None,
            email: self.email.clone(),
            name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
            provider: self.provider,
            uid: self.uid.clone(),
            role: Role::User,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    pub id: Uuid,
    user: Option<AuthUser>,
    role: RoleResolution,
    pub started_at: OffsetDateTime,
    signed_out_at: Option<OffsetDateTime>,
}

impl Session {
    pub fn start(user: AuthUser) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: Some(user),
            role: RoleResolution::Pending,
            started_at: OffsetDateTime::now_utc(),
            signed_out_at: None,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            id: Uuid::new_v4(),
            user: None,
            role: RoleResolution::Failed,
            started_at: OffsetDateTime::now_utc(),
            signed_out_at: None,
        }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.email.as_str())
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some() && self.signed_out_at.is_none()
    }

    pub fn role(&self) -> RoleResolution {
        if self.is_signed_in() {
            self.role
        } else {
            RoleResolution::Failed
        }
    }

    pub fn set_role(&mut self, resolution: RoleResolution) {
        if self.is_signed_in() {
            self.role = resolution;
        }
    }

    pub fn admin_access(&self) -> Access {
        RoleGate::check(self.role(), self.is_signed_in())
    }

    /// The lifecycle actor this session speaks as.
    pub fn actor(&self) -> Option<Actor> {
        if !self.is_signed_in() {
            return None;
        }
        match (self.role(), self.email()) {
            (RoleResolution::Resolved(Role::Admin), _) => Some(Actor::Admin),
            (_, Some(email)) => Some(Actor::customer(email)),
            (_, None) => None,
        }
    }

    /// Drop identity and role; the session cannot be revived.
    pub fn invalidate(&mut self) {
        self.user = None;
        self.role = RoleResolution::Failed;
        self.signed_out_at.get_or_insert_with(OffsetDateTime::now_utc);
    }

    pub fn signed_out_at(&self) -> Option<OffsetDateTime> {
        self.signed_out_at
    }

    /// Where to send the user after a backend status the session must react to.
    pub fn on_status(&mut self, status: u16) -> Option<Redirect> {
        match status {
            401 => {
                self.invalidate();
                Some(Redirect::Login)
            }
            403 => Some(Redirect::Forbidden),
            _ => None,
        }
    }
}
