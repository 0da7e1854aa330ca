use orderflow_auth::{Actor, JwtClaims, Role};
use orderflow_core::UserId;

/// Authenticated identity for a request (resolved actor + raw roles).
///
/// Inserted by the auth middleware; present on every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor: Actor,
    roles: Vec<Role>,
}

impl ActorContext {
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self {
            actor: Actor::from(claims),
            roles: claims.roles.clone(),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn user_id(&self) -> UserId {
        self.actor.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}
