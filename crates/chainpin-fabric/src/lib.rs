//! chainpin-fabric — fabconnect connector for ChainPin.
//!
//! Pins batches through the FireFly chaincode, invokes and queries custom
//! chaincode, and resolves short signer names into full MSP identities
//! (`{mspId}::x509::{subject}::{issuer}`).
//!
//! Fabric has no machine-readable interface description, so FFI generation
//! is unsupported and event signatures are the plain event name.

pub mod config;
pub mod events;
pub mod identity;
pub mod plugin;
pub mod streams;

pub use config::{FabconnectConfig, FabricConfig, FabricContractConfig};
pub use events::FabricEvents;
pub use identity::{FabricIdentity, IdentityResolver};
pub use plugin::{FabricPlugin, Location};
pub use streams::{EventStream, StreamManager, Subscription};
