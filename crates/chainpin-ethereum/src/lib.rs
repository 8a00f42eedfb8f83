//! chainpin-ethereum — ethconnect connector for ChainPin.
//!
//! # Features
//! - BatchPin submission and decoding against the FireFly contract
//! - Multi-contract lifecycle with network-action termination
//! - Custom contract invoke/query with FFI → ABI conversion
//! - ABI → FFI generation and event signatures
//! - Event stream and subscription management over the REST API
//!
//! # Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainpin_core::{FireFlyContracts, NoopMetrics, Plugin};
//! use chainpin_ethereum::{EthereumConfig, EthereumPlugin};
//!
//! # async fn run(config: EthereumConfig) -> Result<(), chainpin_core::PluginError> {
//! let mut plugin = EthereumPlugin::new(Arc::new(NoopMetrics));
//! plugin.init(config).await?;
//! plugin.configure_contract(&mut FireFlyContracts::default()).await?;
//! plugin.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod abi;
pub mod address;
pub mod config;
pub mod events;
pub mod plugin;
pub mod streams;

pub use abi::{AbiEntry, AbiParameter, EthereumFfiParamValidator};
pub use address::validate_eth_address;
pub use config::{EthconnectConfig, EthereumConfig, EthereumContractConfig};
pub use events::EthereumEvents;
pub use plugin::EthereumPlugin;
pub use streams::{EventStream, StreamManager, Subscription};
