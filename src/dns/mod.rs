//! Dynamic address updates
//!
//! A dynamic-DNS style call moves every entry of a credential's group to a
//! new backend address. Entries are saved one at a time and published to the
//! [`Directory`](crate::proxy::directory::Directory) as soon as each save
//! succeeds.

pub mod update;

pub use update::{AddressUpdater, UpdateRequest};
