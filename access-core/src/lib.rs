//! Authorization-and-encryption core for group access tokens and encrypted medical results.
//!
//! This crate contains:
//! - A sorted-pair Keccak Merkle accumulator over authorized identities.
//! - AES-256-GCM / AES-256-CBC payload encryption with wallet-derived or random keys.
//! - The JSON token envelope and its validating codec.
//! - An admit/deny orchestrator that composes membership proofs with an injected on-chain verifier.
//! - Boundary traits for the ledger and the on-chain verifier.

pub mod chain;
pub mod cipher;
pub mod constants;
pub mod errors;
pub mod hash;
pub mod issuer;
pub mod kdf;
pub mod ledger;
pub mod merkle;
pub mod orchestrator;
pub mod records;
pub mod token;
pub mod types;

pub use errors::CoreError;
pub use types::{Hash32, Iv, Key};
