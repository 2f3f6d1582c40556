pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod filter;
pub mod state;
