//! Capture device bindings
//!
//! This module provides:
//! - Device kinds, handles and bindings
//! - The device resource manager that attaches them to the transport

pub mod manager;
pub mod types;

pub use manager::DeviceManager;
pub use types::{DeviceBinding, DeviceGrants, DeviceHandle, DeviceKind};
