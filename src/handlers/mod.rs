pub mod analyze;
pub mod health;
pub mod performance;
pub mod security;
pub mod upload;
