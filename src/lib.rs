pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod poller;
pub mod reporter;
pub mod state;
pub mod telegram;
pub mod types;
pub mod upgrader;
pub mod watchdog;

#[cfg(test)]
mod fake;
