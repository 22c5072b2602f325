pub mod actors;
pub mod bacnet;
pub mod cli;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod ids;
pub mod monitor;
pub mod mqtt;
pub mod store;
pub mod upload;
pub mod writer;
