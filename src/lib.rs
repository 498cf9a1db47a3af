pub mod app;
pub mod auth;
pub mod brevo;
pub mod models;
pub mod ratelimit;
pub mod validate;
