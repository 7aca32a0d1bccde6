pub mod configuration;
pub mod controller;
pub mod device_control;
pub mod discovery;
pub mod error_handling;
pub mod ingestion;
pub mod modem;
pub mod monitoring;
pub mod session_management;
pub mod storage;
pub mod web_interface;

pub use controller::Controller;
