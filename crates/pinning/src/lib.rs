//! Artifact pinning on IPFS through the Pinata API.
//!
//! [`PinataClient`] uploads an [`Artifact`](imagen_core::Artifact) with
//! `pinFileToIPFS`, retrying transient failures with exponential backoff,
//! and turns the returned content hash into a public gateway URL.

pub mod pinata;

pub use pinata::{PinResponse, PinataClient, PinningError, DEFAULT_GATEWAY_TEMPLATE};
