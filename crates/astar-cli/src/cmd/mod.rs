pub mod can;
pub mod config;
pub mod password;
pub mod roles;
pub mod serve;
pub mod session;
