// SPDX-License-Identifier: GPL-3.0-only

//! Tethercam - remote control for tethered cameras
//!
//! Drives a camera over a vendor protocol library and exposes it as an
//! event-driven capture device with live view, still capture and access to
//! the device's option tree.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`]: Public session object and its lifecycle state machine
//! - [`backends`]: Device protocol boundary, per-device workers, option adapter
//! - [`pipelines`]: Still capture pipeline
//! - [`media`]: Decoding of viewfinder and still images
//! - [`config`]: Session configuration
//! - [`storage`]: Capture destination writers
//!
//! # Example
//!
//! ```ignore
//! let protocol = Arc::new(SimulatedProtocol::new(1)?);
//! let mut session = CameraSession::new(protocol.clone(), protocol.descriptors(), config);
//! session.set_state(SessionState::Active);
//! let id = session.capture("");
//! while let Some(event) = session.next_event().await { /* ... */ }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::simulated::SimulatedProtocol;
pub use backends::camera::{
    CameraFrame, CaptureDestinations, CaptureModes, DeviceDescriptor, DeviceProtocol,
    ParameterValue, SessionState, SessionStatus,
};
pub use config::SessionConfig;
pub use errors::{AppError, AppResult, ErrorKind};
pub use session::{CameraSession, SessionEvent, VideoSurface};
