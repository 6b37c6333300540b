pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod generator;
pub mod health;
pub mod lifecycle;
pub mod publish;
pub mod rate_limit;
pub mod reports;
pub mod scheduler;
pub mod store;
pub mod terminal;
pub mod time;
pub mod topics;
pub mod workflow;

#[cfg(test)]
pub mod test_support;
