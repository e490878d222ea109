//! # cidway CLI
//!
//! Command-line front end over [`cidway_core::ContentAccess`].
//!
//! ```text
//! cidway --node-url http://localhost:5001 --gateway https://ipfs.io get <cid>
//! cidway pin ./cat.png --owner alice
//! cidway unpin <cid> --owner alice
//! ```

pub mod commands;
pub mod config;
pub mod state;

pub use commands::{execute, execute_offline, Command, Output};
pub use config::{load, resolve, Overrides};
pub use state::AppState;
