//! LE advertising-set management.
//!
//! The controller exposes a fixed number of advertising sets. The
//! [`advertising::manager::AdvertisingSetManager`] hands those sets out to
//! callers and drives each of them through the HCI command sequences needed to
//! configure, start, rotate the address of, and stop it.

pub mod advertising;
pub mod config;
pub mod core;
