use crate::error::{AstarError, Result};
use crate::permission::{Permission, PermissionSet};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl RoleDefinition {
    pub fn new(name: impl Into<String>, parent: Option<&str>, permissions: &[&str]) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            parent: parent.map(str::to_string),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

fn role_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("static regex is valid"))
}

pub fn validate_role_name(name: &str) -> Result<()> {
    if role_name_re().is_match(name) {
        Ok(())
    } else {
        Err(AstarError::InvalidRoleName(name.to_string()))
    }
}

/// The built-in role chain used when a config defines no roles:
/// `client <- clerk <- lawyer <- owner`.
pub fn default_roles() -> Vec<RoleDefinition> {
    vec![
        RoleDefinition::new("client", None, &["matter:read:own", "document:read:own"])
            .with_display_name("Client"),
        RoleDefinition::new(
            "clerk",
            Some("client"),
            &[
                "matter:read,create,update:team",
                "document:read,create,update:team",
                "client:read,create,update:team",
                "expense:read,create,update:team",
                "memo:read,create,update:team",
            ],
        )
        .with_display_name("Clerk"),
        RoleDefinition::new(
            "lawyer",
            Some("clerk"),
            &[
                "matter:*",
                "document:*",
                "client:*",
                "memo:*",
                "expense:read,create,update,export",
                "member:read",
                "role:read",
            ],
        )
        .with_display_name("Lawyer"),
        RoleDefinition::new(
            "owner",
            Some("lawyer"),
            &["expense:*", "member:manage", "role:manage", "tenant:manage"],
        )
        .with_display_name("Office owner"),
    ]
}

#[derive(Debug, Clone)]
struct CompiledRole {
    definition: RoleDefinition,
    effective: PermissionSet,
}

/// Validated role graph with each role's effective permissions precomputed.
#[derive(Debug, Clone)]
pub struct RoleHierarchy {
    roles: HashMap<String, CompiledRole>,
    order: Vec<String>,
}

/// Every problem in a set of role definitions, in definition order.
///
/// Unlike [`RoleHierarchy::build`], which stops at the first problem, this
/// keeps going so a config can be fixed in one pass. Each cycle is reported
/// once, starting from its first-defined member.
pub fn check_definitions(defs: &[RoleDefinition]) -> Vec<AstarError> {
    let mut problems = Vec::new();
    let mut by_name: HashMap<&str, &RoleDefinition> = HashMap::new();
    let mut order = Vec::with_capacity(defs.len());
    for def in defs {
        if let Err(e) = validate_role_name(&def.name) {
            problems.push(e);
        }
        for p in &def.permissions {
            if let Err(e) = Permission::parse(p) {
                problems.push(e);
            }
        }
        if by_name.contains_key(def.name.as_str()) {
            problems.push(AstarError::DuplicateRole(def.name.clone()));
            continue;
        }
        by_name.insert(&def.name, def);
        order.push(def.name.as_str());
    }

    for &name in &order {
        if let Some(parent) = by_name[name].parent.as_deref() {
            if !by_name.contains_key(parent) {
                problems.push(AstarError::UnknownParent {
                    role: name.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
    }

    let mut reported: HashSet<Vec<&str>> = HashSet::new();
    for &name in &order {
        let mut chain = vec![name];
        let mut current = name;
        while let Some(parent) = by_name[current].parent.as_deref() {
            if !by_name.contains_key(parent) {
                break;
            }
            if parent == name {
                let mut members = chain.clone();
                members.sort_unstable();
                chain.push(parent);
                if reported.insert(members) {
                    problems.push(AstarError::RoleCycle(chain.join(" -> ")));
                }
                break;
            }
            // Leads into a cycle that does not include `name`.
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
    }

    problems
}

impl RoleHierarchy {
    pub fn build(defs: Vec<RoleDefinition>) -> Result<Self> {
        if let Some(problem) = check_definitions(&defs).into_iter().next() {
            return Err(problem);
        }

        let order: Vec<String> = defs.iter().map(|d| d.name.clone()).collect();
        let by_name: HashMap<String, RoleDefinition> =
            defs.into_iter().map(|d| (d.name.clone(), d)).collect();

        let mut roles = HashMap::with_capacity(by_name.len());
        for name in &order {
            let mut effective = PermissionSet::new();
            let mut current = Some(name.as_str());
            while let Some(n) = current {
                let def = &by_name[n];
                for p in &def.permissions {
                    effective.grant(Permission::parse(p)?);
                }
                current = def.parent.as_deref();
            }
            roles.insert(
                name.clone(),
                CompiledRole {
                    definition: by_name[name.as_str()].clone(),
                    effective,
                },
            );
        }

        Ok(Self { roles, order })
    }

    pub fn defaults() -> Self {
        Self::build(default_roles()).expect("built-in roles are valid")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&RoleDefinition> {
        self.roles.get(name).map(|r| &r.definition)
    }

    /// Role names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn effective(&self, name: &str) -> Option<&PermissionSet> {
        self.roles.get(name).map(|r| &r.effective)
    }

    /// Parent chain of `name`, nearest first.
    pub fn ancestors(&self, name: &str) -> Result<Vec<&str>> {
        let role = self
            .roles
            .get(name)
            .ok_or_else(|| AstarError::RoleNotFound(name.to_string()))?;
        let mut out = Vec::new();
        let mut current = role.definition.parent.as_deref();
        while let Some(parent) = current {
            out.push(parent);
            current = self.roles[parent].definition.parent.as_deref();
        }
        Ok(out)
    }

    /// True when `role` is `other` or descends from it.
    pub fn inherits(&self, role: &str, other: &str) -> bool {
        if !self.contains(role) || !self.contains(other) {
            return false;
        }
        role == other
            || self
                .ancestors(role)
                .map(|chain| chain.contains(&other))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::{Action, Resource, Scope};

    #[test]
    fn defaults_build() {
        let h = RoleHierarchy::defaults();
        assert_eq!(
            h.names().collect::<Vec<_>>(),
            vec!["client", "clerk", "lawyer", "owner"]
        );
    }

    #[test]
    fn ancestors_nearest_first() {
        let h = RoleHierarchy::defaults();
        assert_eq!(h.ancestors("owner").unwrap(), vec!["lawyer", "clerk", "client"]);
        assert!(h.ancestors("client").unwrap().is_empty());
        assert!(matches!(
            h.ancestors("ghost"),
            Err(AstarError::RoleNotFound(_))
        ));
    }

    #[test]
    fn inherits_follows_hierarchy() {
        let h = RoleHierarchy::defaults();
        assert!(h.inherits("owner", "clerk"));
        assert!(h.inherits("clerk", "clerk"));
        assert!(!h.inherits("clerk", "lawyer"));
        assert!(!h.inherits("ghost", "client"));
    }

    #[test]
    fn effective_includes_ancestor_grants() {
        let h = RoleHierarchy::defaults();
        let clerk = h.effective("clerk").unwrap();
        // from client
        assert!(clerk.allows(Resource::Document, Action::READ, Scope::Own));
        // own grant
        assert!(clerk.allows(Resource::Expense, Action::CREATE, Scope::Team));
        assert!(!clerk.allows(Resource::Expense, Action::DELETE, Scope::Team));

        let owner = h.effective("owner").unwrap();
        assert!(owner.allows(Resource::Tenant, Action::ALL, Scope::Tenant));
        assert!(owner.allows(Resource::Matter, Action::DELETE, Scope::Tenant));
    }

    #[test]
    fn rejects_unknown_parent() {
        let err = RoleHierarchy::build(vec![RoleDefinition::new("a", Some("b"), &[])]).unwrap_err();
        assert!(matches!(err, AstarError::UnknownParent { .. }));
    }

    #[test]
    fn rejects_cycle() {
        let err = RoleHierarchy::build(vec![
            RoleDefinition::new("a", Some("c"), &[]),
            RoleDefinition::new("b", Some("a"), &[]),
            RoleDefinition::new("c", Some("b"), &[]),
        ])
        .unwrap_err();
        let AstarError::RoleCycle(chain) = err else {
            panic!("expected RoleCycle, got {err:?}");
        };
        assert!(chain.starts_with("a -> c"));
    }

    #[test]
    fn rejects_self_parent() {
        let err = RoleHierarchy::build(vec![RoleDefinition::new("a", Some("a"), &[])]).unwrap_err();
        assert!(matches!(err, AstarError::RoleCycle(_)));
    }

    #[test]
    fn rejects_duplicates_and_bad_names() {
        assert!(matches!(
            RoleHierarchy::build(vec![
                RoleDefinition::new("a", None, &[]),
                RoleDefinition::new("a", None, &[]),
            ]),
            Err(AstarError::DuplicateRole(_))
        ));
        assert!(matches!(
            RoleHierarchy::build(vec![RoleDefinition::new("Bad Name", None, &[])]),
            Err(AstarError::InvalidRoleName(_))
        ));
    }

    #[test]
    fn check_definitions_reports_every_problem() {
        let problems = check_definitions(&[
            RoleDefinition::new("a", Some("missing"), &[]),
            RoleDefinition::new("b", None, &["matter:fly"]),
            RoleDefinition::new("b", None, &[]),
            RoleDefinition::new("c", Some("d"), &[]),
            RoleDefinition::new("d", Some("c"), &[]),
            RoleDefinition::new("e", Some("c"), &[]),
        ]);
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(matches!(problems[0], AstarError::InvalidPermission(_)));
        assert!(matches!(&problems[1], AstarError::DuplicateRole(n) if n == "b"));
        assert!(matches!(&problems[2], AstarError::UnknownParent { role, .. } if role == "a"));
        let AstarError::RoleCycle(chain) = &problems[3] else {
            panic!("expected RoleCycle, got {:?}", problems[3]);
        };
        assert_eq!(chain, "c -> d -> c");
    }

    #[test]
    fn check_definitions_accepts_defaults() {
        assert!(check_definitions(&default_roles()).is_empty());
    }

    #[test]
    fn rejects_bad_permission_string() {
        assert!(matches!(
            RoleHierarchy::build(vec![RoleDefinition::new("a", None, &["matter:fly"])]),
            Err(AstarError::InvalidPermission(_))
        ));
    }
}
