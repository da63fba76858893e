//! Command handlers -- one module per subcommand

pub mod checkpoint;
pub mod config;
pub mod rules;
