pub mod config;
pub mod error;
pub mod flash;
pub mod grant;
pub mod identity;
pub mod remote;
pub mod server;
