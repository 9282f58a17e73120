pub mod admin_dtos;
pub mod auth_dtos;
pub mod campaign_dtos;
pub mod donation_dtos;
pub mod notification_dtos;
