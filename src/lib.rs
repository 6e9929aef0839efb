pub mod cli;
pub mod config;
pub mod drivers;
pub mod identity;
pub mod registry;
pub mod session;
pub mod special_action;
pub mod transport;
pub mod watcher;
