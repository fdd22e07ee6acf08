use crate::error::{AstarError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Bitset of actions on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(u8);

impl Action {
    pub const NONE: Action = Action(0);
    pub const READ: Action = Action(1);
    pub const CREATE: Action = Action(1 << 1);
    pub const UPDATE: Action = Action(1 << 2);
    pub const DELETE: Action = Action(1 << 3);
    pub const EXPORT: Action = Action(1 << 4);
    /// Granting `MANAGE` grants every other action.
    pub const MANAGE: Action = Action(1 << 5);
    pub const ALL: Action = Action(0b11_1111);

    const NAMED: [(&'static str, Action); 6] = [
        ("read", Action::READ),
        ("create", Action::CREATE),
        ("update", Action::UPDATE),
        ("delete", Action::DELETE),
        ("export", Action::EXPORT),
        ("manage", Action::MANAGE),
    ];

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `self & required == required`.
    pub const fn contains(self, required: Action) -> bool {
        self.0 & required.0 == required.0
    }

    /// Mask as granted: `MANAGE` widens to every action.
    pub const fn expand(self) -> Self {
        if self.0 & Action::MANAGE.0 != 0 {
            Action::ALL
        } else {
            self
        }
    }

    pub fn parse_one(name: &str) -> Option<Action> {
        if name == "*" {
            return Some(Action::ALL);
        }
        Action::NAMED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, a)| *a)
    }

    pub fn names(self) -> Vec<&'static str> {
        Action::NAMED
            .iter()
            .filter(|(_, a)| self.contains(*a))
            .map(|(n, _)| *n)
            .collect()
    }
}

impl BitOr for Action {
    type Output = Action;
    fn bitor(self, rhs: Action) -> Action {
        Action(self.0 | rhs.0)
    }
}

impl BitOrAssign for Action {
    fn bitor_assign(&mut self, rhs: Action) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Action {
    type Output = Action;
    fn bitand(self, rhs: Action) -> Action {
        Action(self.0 & rhs.0)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Action::ALL {
            return write!(f, "*");
        }
        write!(f, "{}", self.names().join(","))
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Matter,
    Document,
    Client,
    Expense,
    Memo,
    Member,
    Role,
    Tenant,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::Matter,
        Resource::Document,
        Resource::Client,
        Resource::Expense,
        Resource::Memo,
        Resource::Member,
        Resource::Role,
        Resource::Tenant,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Matter => "matter",
            Resource::Document => "document",
            Resource::Client => "client",
            Resource::Expense => "expense",
            Resource::Memo => "memo",
            Resource::Member => "member",
            Resource::Role => "role",
            Resource::Tenant => "tenant",
        }
    }
}

impl FromStr for Resource {
    type Err = AstarError;

    fn from_str(s: &str) -> Result<Self> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AstarError::InvalidPermission(s.to_string()))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// How far a grant reaches. Ordered: `Own < Team < Tenant`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Own,
    Team,
    #[default]
    Tenant,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Own, Scope::Team, Scope::Tenant];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Own => "own",
            Scope::Team => "team",
            Scope::Tenant => "tenant",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Scope {
    type Err = AstarError;

    fn from_str(s: &str) -> Result<Self> {
        Scope::ALL
            .into_iter()
            .find(|sc| sc.as_str() == s)
            .ok_or_else(|| AstarError::InvalidPermission(s.to_string()))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Permission
// ---------------------------------------------------------------------------

/// A single grant or requirement, written `resource:action[,action][:scope]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    pub resource: Resource,
    pub actions: Action,
    pub scope: Scope,
}

impl Permission {
    pub fn new(resource: Resource, actions: Action, scope: Scope) -> Self {
        Self {
            resource,
            actions,
            scope,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || AstarError::InvalidPermission(s.to_string());
        let mut parts = s.trim().split(':');
        let resource = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let actions = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let scope = parts.next();
        if parts.next().is_some() {
            return Err(invalid());
        }

        let resource: Resource = resource.parse().map_err(|_| invalid())?;
        let mut mask = Action::NONE;
        for name in actions.split(',') {
            mask |= Action::parse_one(name.trim()).ok_or_else(invalid)?;
        }
        let scope = match scope {
            Some(sc) => sc.parse().map_err(|_| invalid())?,
            None => Scope::default(),
        };
        Ok(Permission::new(resource, mask, scope))
    }
}

impl FromStr for Permission {
    type Err = AstarError;

    fn from_str(s: &str) -> Result<Self> {
        Permission::parse(s)
    }
}

impl TryFrom<String> for Permission {
    type Error = AstarError;

    fn try_from(s: String) -> Result<Self> {
        Permission::parse(&s)
    }
}

impl From<Permission> for String {
    fn from(p: Permission) -> String {
        p.to_string()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.resource, self.actions, self.scope)
    }
}

// ---------------------------------------------------------------------------
// PermissionSet
// ---------------------------------------------------------------------------

/// Compiled grants: for each resource, one action mask per scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    grants: BTreeMap<Resource, [Action; 3]>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, permission: Permission) {
        let masks = self
            .grants
            .entry(permission.resource)
            .or_insert([Action::NONE; 3]);
        masks[permission.scope.index()] |= permission.actions.expand();
    }

    pub fn extend(&mut self, other: &PermissionSet) {
        for (resource, masks) in &other.grants {
            let mine = self.grants.entry(*resource).or_insert([Action::NONE; 3]);
            for (m, o) in mine.iter_mut().zip(masks) {
                *m |= *o;
            }
        }
    }

    /// Whether `actions` on `resource` are granted at `scope` or wider.
    pub fn allows(&self, resource: Resource, actions: Action, scope: Scope) -> bool {
        let Some(masks) = self.grants.get(&resource) else {
            return actions.is_empty();
        };
        let granted = masks[scope.index()..]
            .iter()
            .fold(Action::NONE, |acc, m| acc | *m);
        granted.contains(actions)
    }

    pub fn allows_permission(&self, permission: &Permission) -> bool {
        self.allows(permission.resource, permission.actions, permission.scope)
    }

    pub fn is_empty(&self) -> bool {
        self.grants.values().all(|m| m.iter().all(|a| a.is_empty()))
    }

    /// Normalized grants, one per non-empty (resource, scope) pair.
    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.grants.iter().flat_map(|(resource, masks)| {
            Scope::ALL.into_iter().filter_map(move |scope| {
                let actions = masks[scope.index()];
                (!actions.is_empty()).then(|| Permission::new(*resource, actions, scope))
            })
        })
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.iter().map(|p| p.to_string()).collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = PermissionSet::new();
        for p in iter {
            set.grant(p);
        }
        set
    }
}
