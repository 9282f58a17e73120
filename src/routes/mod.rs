pub mod admin;
pub mod analytics;
pub mod auth;
pub mod campaigns;
pub mod donations;
pub mod notifications;
