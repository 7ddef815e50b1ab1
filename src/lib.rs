//! hostgate - host-based reverse proxy
//!
//! Routes each request by its virtual host to a backend address held in a
//! live routing table, refuses targets that point back into the managed
//! fleet, injects per-tenant branding into proxied HTML, and lets tenants
//! move their backend address with an authenticated dynamic-DNS style call.

pub mod config;
pub mod dns;
pub mod error;
pub mod http;
pub mod proxy;
pub mod server;
pub mod store;

pub use error::{ProxyError, Result};
