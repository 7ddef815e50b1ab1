//! Reverse proxy functionality
//!
//! The routing table, host resolution, backend forwarding and the HTML
//! rewriting applied on the way back.

pub mod directory;
pub mod resolver;
pub mod rewriter;
pub mod upstream;

pub use directory::{Directory, Snapshot};
pub use resolver::{Resolver, Route, Scheme};
pub use rewriter::ResponseRewriter;
pub use upstream::Forwarder;
