// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   CameraSession     │  ← Lifecycle requests, event republishing
//! └──────────┬──────────┘
//!            │ commands (FIFO)      ▲ events
//!            ▼                      │
//! ┌─────────────────────┐           │
//! │    DeviceWorker     │───────────┘  one thread per device
//! └──────────┬──────────┘
//!            │ blocking calls
//!            ▼
//! ┌─────────────────────┐
//! │  DeviceConnection   │  ← Vendor protocol, not thread-safe
//! └─────────────────────┘
//! ```

pub mod options;
pub mod simulated;
pub mod types;
pub mod viewfinder;
pub mod worker;

pub use types::*;
pub use worker::{DeviceWorker, WorkerEvent};

use crate::errors::DeviceError;
use std::time::Duration;

/// Result type for device protocol calls
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Entry point of a vendor protocol library
///
/// Shared between workers; only ever used to create connections.
pub trait DeviceProtocol: Send + Sync {
    /// Allocate a handle and bind it to the descriptor's port
    fn open(&self, descriptor: &DeviceDescriptor) -> DeviceResult<Box<dyn DeviceConnection>>;
}

/// Open connection to one device
///
/// Not thread-safe: a connection is created, used and dropped on the thread
/// of the worker that owns it.
pub trait DeviceConnection {
    /// Fetch the root of the configuration tree
    fn config(&mut self) -> DeviceResult<OptionNode>;

    /// Commit a whole configuration tree to the device
    fn set_config(&mut self, root: &OptionNode) -> DeviceResult<()>;

    /// Trigger a still capture; returns where the file landed on the device
    fn capture_still(&mut self) -> DeviceResult<CameraFilePath>;

    /// Download a file from the device
    fn download(&mut self, path: &CameraFilePath) -> DeviceResult<Vec<u8>>;

    /// Grab one viewfinder frame (encoded, usually JPEG) into `buffer`
    fn capture_preview(&mut self, buffer: &mut Vec<u8>) -> DeviceResult<()>;

    /// Wait for the next device event
    fn wait_for_event(&mut self, timeout: Duration) -> DeviceResult<DeviceEvent>;

    /// Leave remote control mode; the connection is dropped right after
    fn exit(&mut self);
}
