//! HTTP route handlers owned by the bootstrap layer.
//!
//! Domain routes are supplied by the embedding application; only the
//! operational probes live here.

pub mod health;
