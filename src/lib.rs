pub mod admin;
pub mod agent;
pub mod config;
pub mod shared;
pub mod tickets;
