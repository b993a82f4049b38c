//! Access control for moderation commands
//!
//! The dispatcher treats the policy as an opaque predicate over the caller
//! and a required category; the tier-to-role mapping below is configuration,
//! not router logic.

use derive_more::Display;

use crate::router::event::Caller;

/// Required staff tier for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum AccessCategory {
    #[display("MOD_AND_ABOVE")]
    ModAndAbove,
    #[display("ADMIN_AND_ABOVE")]
    AdminAndAbove,
    #[display("DEVELOPER")]
    Developer,
}

/// Predicate deciding whether a caller meets a category
#[cfg_attr(test, mockall::automock)]
pub trait AccessPolicy: Send + Sync {
    fn authenticate(&self, caller: &Caller, category: AccessCategory) -> bool;
}

/// Role-name-based tier policy
pub struct RoleAccessPolicy {
    developer_roles: Vec<String>,
    admin_roles: Vec<String>,
    moderator_roles: Vec<String>,
}

impl Default for RoleAccessPolicy {
    fn default() -> Self {
        Self {
            developer_roles: vec!["Developer".to_string()],
            admin_roles: vec!["Admin".to_string(), "Administrator".to_string()],
            moderator_roles: vec!["Moderator".to_string(), "Mod".to_string()],
        }
    }
}

impl RoleAccessPolicy {
    #[must_use]
    pub fn new(
        developer_roles: Vec<String>,
        admin_roles: Vec<String>,
        moderator_roles: Vec<String>,
    ) -> Self {
        Self {
            developer_roles,
            admin_roles,
            moderator_roles,
        }
    }

    fn has_any(caller: &Caller, roles: &[String]) -> bool {
        caller.role_names.iter().any(|name| roles.contains(name))
    }
}

impl AccessPolicy for RoleAccessPolicy {
    fn authenticate(&self, caller: &Caller, category: AccessCategory) -> bool {
        match category {
            AccessCategory::Developer => Self::has_any(caller, &self.developer_roles),
            AccessCategory::AdminAndAbove => {
                Self::has_any(caller, &self.admin_roles)
                    || Self::has_any(caller, &self.developer_roles)
            }
            AccessCategory::ModAndAbove => {
                Self::has_any(caller, &self.moderator_roles)
                    || Self::has_any(caller, &self.admin_roles)
                    || Self::has_any(caller, &self.developer_roles)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::event::testing::caller;

    #[test]
    fn test_mod_and_above_accepts_higher_tiers() {
        let policy = RoleAccessPolicy::default();

        assert!(policy.authenticate(&caller(1, &["Moderator"]), AccessCategory::ModAndAbove));
        assert!(policy.authenticate(&caller(1, &["Admin"]), AccessCategory::ModAndAbove));
        assert!(policy.authenticate(&caller(1, &["Developer"]), AccessCategory::ModAndAbove));
        assert!(!policy.authenticate(&caller(1, &["Verified"]), AccessCategory::ModAndAbove));
        assert!(!policy.authenticate(&caller(1, &[]), AccessCategory::ModAndAbove));
    }

    #[test]
    fn test_admin_and_above_rejects_moderators() {
        let policy = RoleAccessPolicy::default();

        assert!(!policy.authenticate(&caller(1, &["Moderator"]), AccessCategory::AdminAndAbove));
        assert!(policy.authenticate(&caller(1, &["Administrator"]), AccessCategory::AdminAndAbove));
        assert!(policy.authenticate(&caller(1, &["Developer"]), AccessCategory::AdminAndAbove));
    }

    #[test]
    fn test_developer_is_exact() {
        let policy = RoleAccessPolicy::default();

        assert!(policy.authenticate(&caller(1, &["Developer"]), AccessCategory::Developer));
        assert!(!policy.authenticate(&caller(1, &["Admin"]), AccessCategory::Developer));
    }

    #[test]
    fn test_category_display_matches_store_convention() {
        assert_eq!(AccessCategory::ModAndAbove.to_string(), "MOD_AND_ABOVE");
        assert_eq!(AccessCategory::AdminAndAbove.to_string(), "ADMIN_AND_ABOVE");
        assert_eq!(AccessCategory::Developer.to_string(), "DEVELOPER");
    }
}
