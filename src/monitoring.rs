//! Cell-identity monitoring of the live fleet.
//!
//! Each SIM's serving cell is compared against the cell recorded in the
//! number registry. A change is reported as a [`CidChangeEvent`]; with
//! quarantine mode enabled the modem is also taken off the USB bus and
//! dropped from the fleet.

pub mod cell_monitor;

pub use cell_monitor::{CellMonitor, CidChangeEvent};
