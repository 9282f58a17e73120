pub mod audit;
pub mod donation_service;
pub mod password;
pub mod payment_gateway;
pub mod token_service;
