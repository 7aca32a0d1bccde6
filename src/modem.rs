//! Modem driver layer.
//!
//! Everything that speaks to a physical GSM modem lives here:
//! - `driver`: the [`ModemDriver`] capability trait and the values it returns.
//! - `transport`: line-oriented AT command transport over a serial port.
//! - `at_driver`: the AT command set implementation of [`ModemDriver`].
//!
//! Sessions (`session_management`) own one boxed driver each and never share it.
//! Driver calls block on serial IO; async callers go through [`blocking_io`].

pub mod at_driver;
pub mod driver;
#[cfg(test)]
pub mod fake;
pub mod transport;

pub use at_driver::{AtModem, DriverConfig};
pub use driver::{
    Cursor, DeviceMessage, Location, ModemDriver, NetworkInfo, Page, RegistrationState,
    StoragePartition, StoreStatus,
};
pub use transport::{AtTransport, Connector, SerialConnector, SerialTransport};

/// Runs a blocking device call from async code.
///
/// On a multi-threaded runtime the worker hands its other tasks off for the
/// duration of `f`. Elsewhere (current-thread runtimes, plain threads) `f`
/// runs in place.
pub fn blocking_io<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}
