//! Request handlers.

pub mod command;
pub mod health;
pub mod oauth;
