pub mod catalog;
pub mod channels;
pub mod client;
pub mod config;
pub mod render;
pub mod reports;
