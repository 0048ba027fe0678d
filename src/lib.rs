pub mod catalog;
pub mod config;
pub mod errors;
pub mod executor;
pub mod flake;
pub mod order;
pub mod session;
pub mod signal;
pub mod tracker;
pub mod ui;
