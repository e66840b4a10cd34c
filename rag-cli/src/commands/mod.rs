//! Subcommand implementations, one module per top-level command group.

pub mod ask;
pub mod config_cmd;
pub mod ingest;
pub mod tag;
