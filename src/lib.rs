pub mod admin;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extend;
pub mod flow;
pub mod session;
