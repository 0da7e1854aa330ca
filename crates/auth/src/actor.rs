use orderflow_core::UserId;

use crate::claims::JwtClaims;

/// The resolved acting identity for one request or connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    /// Administrative actor (may change order status, sees all orders).
    pub privileged: bool,
}

impl Actor {
    pub fn new(user_id: UserId, privileged: bool) -> Self {
        Self { user_id, privileged }
    }

    pub fn customer(user_id: UserId) -> Self {
        Self::new(user_id, false)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, true)
    }

    /// Whether this actor may read a resource owned by `owner`.
    pub fn can_view(&self, owner: UserId) -> bool {
        self.privileged || self.user_id == owner
    }
}

impl From<&JwtClaims> for Actor {
    fn from(claims: &JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            privileged: claims.roles.iter().any(|r| r.is_privileged()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::Role;

    #[test]
    fn admin_role_marks_actor_privileged() {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: UserId::new(),
            roles: vec![Role::new("support"), Role::new("admin")],
            issued_at: now,
            expires_at: now,
        };
        let actor = Actor::from(&claims);
        assert!(actor.privileged);
        assert_eq!(actor.user_id, claims.sub);
    }

    #[test]
    fn customer_sees_only_own_resources() {
        let me = UserId::new();
        let actor = Actor::customer(me);
        assert!(actor.can_view(me));
        assert!(!actor.can_view(UserId::new()));
        assert!(Actor::admin(UserId::new()).can_view(me));
    }
}
