//! Tucker Sync server: a server-mediated data synchronization service for
//! multi-device client applications (see `SPEC_FULL.md` for the full
//! design). The core is the synchronization-count coordination protocol in
//! [`sync`] that lets multiple clients upload concurrently while
//! preserving a monotonic, gap-free-per-commit ordering.

pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod handlers;
pub mod objects;
pub mod protocol;
pub mod server;
pub mod sync;
