//! CLI commands

pub mod pki;
pub mod vault;
