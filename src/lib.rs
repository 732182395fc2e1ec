pub mod config;
pub mod console;
pub mod control;
pub mod error;
pub mod ingest;
pub mod sensor;
pub mod session;
