//! # Custodia
//!
//! Custodial wallet send-orchestration engine.
//!
//! The engine custodies per-user seed material encrypted at rest, derives
//! blockchain accounts from it on demand, and dispatches value transfers
//! across EVM chains (plain EOAs, ERC-4337 smart accounts, EIP-7702 delegated
//! accounts) and Substrate-based chains. It is a library: the HTTP surface,
//! persistence backend, and chain infrastructure are collaborators reached
//! through the narrow interfaces in [`storage`], [`indexer`], [`bundler`],
//! [`provider`] and [`substrate`].

pub mod accounts;
pub mod amount;
pub mod balance;
pub mod bundler;
pub mod cache;
pub mod chains;
pub mod config;
pub mod constants;
pub mod decimals;
pub mod error;
pub mod indexer;
pub mod orchestrator;
pub mod provider;
pub mod ratelimit;
pub mod storage;
pub mod substrate;
pub mod vault;
