//! Concrete provider adapters.
//!
//! Each adapter is a mechanical translation of one vendor's control-plane
//! API onto the [`crate::provider::Provider`] capability set. Adapters bind
//! their own readiness vocabulary and poll tuning; everything above them is
//! vendor-agnostic.

pub mod digitalocean;
pub mod scaleway;
