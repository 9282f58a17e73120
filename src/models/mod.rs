pub mod audit_log;
pub mod campaign;
pub mod common;
pub mod donation;
pub mod notification;
pub mod user;
