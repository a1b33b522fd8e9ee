pub mod assistant;
pub mod auth;
pub mod chat;
pub mod error;
pub mod guard;
pub mod profile;
pub mod session;
