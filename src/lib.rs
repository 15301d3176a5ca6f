// Gatewait - Library root

pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod loadgen;
