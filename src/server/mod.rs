//! Network front end: the accept loop and per-request dispatch.

pub mod gateway;
pub mod listener;

pub use gateway::Gateway;
