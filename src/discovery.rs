//! Device discovery.
//!
//! Finds the modems attached to this host: every serial-class entry of the
//! device directory is probed with `AT`, then asked for its IMEI so that a
//! modem exposing several serial endpoints is only kept once.

pub mod scanner;

pub use scanner::{scan, DiscoveredDevice};
