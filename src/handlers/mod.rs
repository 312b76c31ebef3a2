pub mod cache_admin;
pub mod chat;
pub mod health;
pub mod plan;
