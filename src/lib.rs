//! stakewarden - administrative toolkit for a multi-reward staking contract.
//!
//! Reads pool state over JSON-RPC, prices reward tokens against the staked
//! native token, recomputes correct per-second reward rates for a target
//! APR, and reconciles on-chain state with corrective transactions behind
//! an explicit `--execute` gate.

pub mod chain;
pub mod config;
pub mod math;
pub mod pricing;
pub mod reconcile;
pub mod types;

// Re-export the core value types for convenience
pub use types::{AprDiagnosis, ConversionRate, OnChainPoolState, PriceQuote, RewardRateResult};
