pub mod config;
pub mod error;
pub mod identity;

// presence
pub mod registry;
pub mod server_types;

// routing
pub mod delivery;
pub mod dispatcher;

// transport
pub mod client_handler;
pub mod server_listener;
