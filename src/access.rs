//! Capability checks.
//!
//! Every privileged engine operation asks one injected [`AccessPolicy`] instead
//! of inspecting roles itself.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::AccessConfig;
use crate::error::{AppError, AppResult};

/// Operations that require a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    GenerateReport,
    RegenerateReport,
    ViewReport,
    ReviewReport,
    SubmitFeedback,
    Broadcast,
    ViewTrendingKeywords,
}

impl Action {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GenerateReport => "generate_report",
            Action::RegenerateReport => "regenerate_report",
            Action::ViewReport => "view_report",
            Action::ReviewReport => "review_report",
            Action::SubmitFeedback => "submit_feedback",
            Action::Broadcast => "broadcast",
            Action::ViewTrendingKeywords => "view_trending_keywords",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relationships of the resource being acted on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessContext {
    /// Caregiver of the visit.
    pub caregiver_id: Option<String>,
    /// Guardian of the recipient.
    pub guardian_id: Option<String>,
}

impl AccessContext {
    /// Context for an operation not tied to a visit.
    pub fn global() -> Self {
        Self::default()
    }

    /// Context for a visit of a recipient.
    pub fn for_visit(caregiver_id: impl Into<String>, guardian_id: Option<String>) -> Self {
        Self {
            caregiver_id: Some(caregiver_id.into()),
            guardian_id,
        }
    }

    fn is_caregiver(&self, actor_id: &str) -> bool {
        self.caregiver_id.as_deref() == Some(actor_id)
    }

    fn is_guardian(&self, actor_id: &str) -> bool {
        self.guardian_id.as_deref() == Some(actor_id)
    }
}

/// Decides whether an actor may perform an action.
pub trait AccessPolicy: Send + Sync {
    /// Whether `actor_id` may perform `action` in `context`.
    fn allows(&self, actor_id: &str, action: Action, context: &AccessContext) -> bool;

    /// Like [`AccessPolicy::allows`], as a `Forbidden` error.
    fn check(&self, actor_id: &str, action: Action, context: &AccessContext) -> AppResult<()> {
        if self.allows(actor_id, action, context) {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                actor_id: actor_id.to_string(),
                action: action.to_string(),
            })
        }
    }
}

/// Default policy: configured admins may do anything; otherwise the visit's
/// caregiver writes reports and the recipient's guardian reads and answers them.
#[derive(Debug, Clone, Default)]
pub struct RoleBasedAccess {
    admins: HashSet<String>,
}

impl RoleBasedAccess {
    /// Create a policy from configuration.
    pub fn new(config: &AccessConfig) -> Self {
        Self {
            admins: config.admin_user_ids.iter().cloned().collect(),
        }
    }

    /// Whether the actor is a configured admin.
    pub fn is_admin(&self, actor_id: &str) -> bool {
        self.admins.contains(actor_id)
    }
}

impl AccessPolicy for RoleBasedAccess {
    fn allows(&self, actor_id: &str, action: Action, context: &AccessContext) -> bool {
        if self.is_admin(actor_id) {
            return true;
        }

        match action {
            Action::GenerateReport | Action::RegenerateReport => context.is_caregiver(actor_id),
            Action::ViewReport => context.is_caregiver(actor_id) || context.is_guardian(actor_id),
            Action::ReviewReport => context.is_guardian(actor_id),
            Action::SubmitFeedback => context.is_guardian(actor_id),
            Action::Broadcast | Action::ViewTrendingKeywords => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RoleBasedAccess {
        RoleBasedAccess::new(&AccessConfig {
            admin_user_ids: vec!["admin-1".to_string()],
        })
    }

    fn visit_context() -> AccessContext {
        AccessContext::for_visit("caregiver-1", Some("guardian-1".to_string()))
    }

    #[test]
    fn test_caregiver_capabilities() {
        let p = policy();
        let ctx = visit_context();

        assert!(p.allows("caregiver-1", Action::GenerateReport, &ctx));
        assert!(p.allows("caregiver-1", Action::ViewReport, &ctx));
        assert!(!p.allows("caregiver-1", Action::ReviewReport, &ctx));
        assert!(!p.allows("caregiver-1", Action::SubmitFeedback, &ctx));
    }

    #[test]
    fn test_guardian_capabilities() {
        let p = policy();
        let ctx = visit_context();

        assert!(!p.allows("guardian-1", Action::GenerateReport, &ctx));
        assert!(p.allows("guardian-1", Action::ViewReport, &ctx));
        assert!(p.allows("guardian-1", Action::ReviewReport, &ctx));
        assert!(p.allows("guardian-1", Action::SubmitFeedback, &ctx));
    }

    #[test]
    fn test_admin_only_actions() {
        let p = policy();
        assert!(p.allows("admin-1", Action::Broadcast, &AccessContext::global()));
        assert!(p.allows("admin-1", Action::ViewTrendingKeywords, &AccessContext::global()));
        assert!(!p.allows("caregiver-1", Action::Broadcast, &visit_context()));
    }

    #[test]
    fn test_check_returns_forbidden() {
        let err = policy()
            .check("stranger", Action::ViewReport, &visit_context())
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { ref action, .. } if action == "view_report"));
    }
}
