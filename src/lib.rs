//! Keeps a single wireguard interface provisioned from a lease server: the
//! device itself, its key pair, and the address, routes and peer handed out
//! with each lease.

pub mod agent;
pub mod error;
pub mod identity;
pub mod lease;
pub mod link;
pub mod tunnel;
pub mod wg;

pub use agent::Agent;
pub use error::Error;
