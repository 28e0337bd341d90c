//! Operational services around the core engine

pub mod status;

pub use status::{StatusServer, StatusState, SupervisorHealth};
