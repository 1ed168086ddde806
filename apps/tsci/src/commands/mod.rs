//! Command modules for the tsci CLI.
//!
//! - [`up`] - Install, start the daemon and connect to the tailnet
//! - [`install`] - Download, verify and install only
//! - [`resolve`] - Show which artifact would be installed
//! - [`version`] - Display version information

pub mod install;
pub mod resolve;
pub mod up;
pub mod version;
