pub mod agent;
pub mod cli;
pub mod deps;
pub mod devserver;
pub mod files;
pub mod fingerprint;
pub mod http;
pub mod hub;
pub mod log_relay;
pub mod reload;
pub mod remote_vars;
pub mod watcher;
pub mod ws;
