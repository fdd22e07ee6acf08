pub mod config;
pub mod error;
pub mod evaluator;
pub mod io;
pub mod jwt;
pub mod password;
pub mod permission;
pub mod role;
pub mod token;

pub use config::Config;
pub use error::{AstarError, Result};
pub use evaluator::{AccessRequest, Decision, PermissionEvaluator, Subject};
pub use permission::{Action, Permission, PermissionSet, Resource, Scope};
pub use role::{RoleDefinition, RoleHierarchy};
pub use token::{Credentials, RefreshPolicy, TokenResponse};
