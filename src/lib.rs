//! Grantry - group-based permission ownership and grant requests
//!
//! Resolves which groups may approve which permission and argument pairs,
//! and runs the lifecycle of requests asking for such grants.

pub mod entities;
pub mod errors;
pub mod permissions;
pub mod settings;
pub mod storage;
