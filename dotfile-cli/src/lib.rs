//! dotfile client library: configuration, the HTTP remote and the commands
//! run by the `dotfile` binary.

pub mod commands;
pub mod config;
pub mod remote;

pub use commands::Env;
pub use config::ClientConfig;
pub use remote::HttpRemote;
