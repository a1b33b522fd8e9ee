pub mod auth;
pub mod chat;
pub mod dashboard;
pub mod feedback;
pub mod health;
pub mod profile;
pub mod session;
