use crate::error::{AstarError, Result};
use crate::permission::{Action, Permission, PermissionSet, Resource, Scope};
use crate::role::RoleHierarchy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// The authenticated principal a decision is made for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub user_id: String,
    pub tenant: String,
    pub roles: Vec<String>,
}

/// What the subject is trying to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub resource: Resource,
    pub actions: Action,
    pub scope: Scope,
    /// Owner of the target record, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Tenant of the target record, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

impl AccessRequest {
    pub fn new(permission: Permission) -> Self {
        Self {
            resource: permission.resource,
            actions: permission.actions,
            scope: permission.scope,
            owner: None,
            tenant: None,
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn in_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    fn required(&self, subject: &Subject) -> Permission {
        let scope = match &self.owner {
            Some(owner) if *owner == subject.user_id => Scope::Own,
            _ => self.scope,
        };
        Permission::new(self.resource, self.actions, scope)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    /// Role whose grants satisfied the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub reason: String,
}

impl Decision {
    fn allow(role: &str, required: &Permission) -> Self {
        Self {
            allowed: true,
            role: Some(role.to_string()),
            reason: format!("granted {required} via role '{role}'"),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            role: None,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    hierarchy: Arc<RoleHierarchy>,
}

impl PermissionEvaluator {
    pub fn new(hierarchy: Arc<RoleHierarchy>) -> Self {
        Self { hierarchy }
    }

    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    pub fn evaluate(&self, subject: &Subject, request: &AccessRequest) -> Decision {
        if let Some(tenant) = &request.tenant {
            if *tenant != subject.tenant {
                return Decision::deny("cross-tenant access denied");
            }
        }

        let required = request.required(subject);
        for role in &subject.roles {
            let Some(set) = self.hierarchy.effective(role) else {
                warn!(role = %role, user = %subject.user_id, "ignoring unknown role");
                continue;
            };
            if set.allows_permission(&required) {
                debug!(role = %role, user = %subject.user_id, permission = %required, "access granted");
                return Decision::allow(role, &required);
            }
        }

        if subject.roles.is_empty() {
            Decision::deny(format!("missing permission {required}: subject has no roles"))
        } else {
            Decision::deny(format!("missing permission {required}"))
        }
    }

    pub fn require(&self, subject: &Subject, request: &AccessRequest) -> Result<()> {
        let decision = self.evaluate(subject, request);
        if decision.allowed {
            Ok(())
        } else {
            Err(AstarError::Forbidden(decision.reason))
        }
    }

    /// Union of every known role the subject holds.
    pub fn effective_for(&self, subject: &Subject) -> PermissionSet {
        let mut set = PermissionSet::new();
        for role in &subject.roles {
            if let Some(effective) = self.hierarchy.effective(role) {
                set.extend(effective);
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> PermissionEvaluator {
        PermissionEvaluator::new(Arc::new(RoleHierarchy::defaults()))
    }

    fn subject(roles: &[&str]) -> Subject {
        Subject {
            user_id: "u-1".into(),
            tenant: "firm-a".into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn request(p: &str) -> AccessRequest {
        AccessRequest::new(Permission::parse(p).unwrap())
    }

    #[test]
    fn lawyer_can_delete_matter() {
        let d = evaluator().evaluate(&subject(&["lawyer"]), &request("matter:delete"));
        assert!(d.allowed);
        assert_eq!(d.role.as_deref(), Some("lawyer"));
    }

    #[test]
    fn clerk_cannot_delete_matter() {
        let d = evaluator().evaluate(&subject(&["clerk"]), &request("matter:delete"));
        assert!(!d.allowed);
        assert!(d.reason.contains("matter:delete:tenant"));
    }

    #[test]
    fn ownership_narrows_scope() {
        let e = evaluator();
        let s = subject(&["client"]);
        assert!(!e.evaluate(&s, &request("matter:read")).allowed);
        assert!(e.evaluate(&s, &request("matter:read").owned_by("u-1")).allowed);
        assert!(!e.evaluate(&s, &request("matter:read").owned_by("u-2")).allowed);
    }

    #[test]
    fn cross_tenant_is_denied_even_for_owner() {
        let d = evaluator().evaluate(
            &subject(&["owner"]),
            &request("matter:read").in_tenant("firm-b"),
        );
        assert!(!d.allowed);
        assert_eq!(d.reason, "cross-tenant access denied");
    }

    #[test]
    fn first_matching_role_wins_and_unknown_roles_are_skipped() {
        let d = evaluator().evaluate(
            &subject(&["ghost", "clerk", "owner"]),
            &request("memo:read:team"),
        );
        assert!(d.allowed);
        assert_eq!(d.role.as_deref(), Some("clerk"));
    }

    #[test]
    fn no_roles_denies() {
        let d = evaluator().evaluate(&subject(&[]), &request("matter:read:own"));
        assert!(!d.allowed);
        assert!(d.reason.contains("no roles"));
    }

    #[test]
    fn require_maps_denial_to_forbidden() {
        let e = evaluator();
        assert!(e.require(&subject(&["owner"]), &request("tenant:manage")).is_ok());
        assert!(matches!(
            e.require(&subject(&["clerk"]), &request("tenant:manage")),
            Err(AstarError::Forbidden(_))
        ));
    }

    #[test]
    fn effective_for_unions_roles() {
        let set = evaluator().effective_for(&subject(&["client", "ghost"]));
        assert_eq!(set.to_strings(), vec!["matter:read:own", "document:read:own"]);
    }
}
