pub mod auth;
pub mod health;
pub mod permissions;
pub mod roles;
