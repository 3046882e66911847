pub mod auth;
pub mod config;
pub mod credentials;
pub mod duration;
