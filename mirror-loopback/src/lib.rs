//! # mirror-loopback: Loopback Diagnostic
//!
//! Mirrors the synthetic screen and tone through a real sender and
//! receiver on the loopback interface and logs what arrives. Useful to
//! check a build, a codec choice, or an MTU setting without devices.
//!
//! Settings come from a TOML file (see [`config::LoopbackConfig`]).

pub mod config;
pub mod loopback;
