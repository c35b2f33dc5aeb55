//! Image generator agent.
//!
//! Listens for step notifications on the payments socket, generates an
//! image for every Pending step, pins it on IPFS and reports the step as
//! Completed with the public URL.
//!
//! - [`config`]: environment-driven configuration.
//! - [`ports`]: collaborator traits and their production adapters.
//! - [`processor`]: the per-step lifecycle.
//! - [`runtime`]: wiring of the subscription and worker tasks.

pub mod config;
pub mod ports;
pub mod processor;
pub mod runtime;
