// SPDX-License-Identifier: GPL-3.0-only

//! Still capture on the device thread
//!
//! Every device call can fail on its own. Each failure is reported as a
//! resource error for the request, and the mirror is put back down no matter
//! which step failed.

use crate::backends::camera::options::{drain_events, set_mirror_position};
use crate::backends::camera::types::{CaptureModes, MirrorPosition, SessionStatus};
use crate::backends::camera::DeviceConnection;
use crate::config::SessionConfig;
use crate::errors::ErrorKind;
use tracing::{debug, info, warn};

/// One still capture request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub id: u32,
    /// Destination file name handed through to the writer
    pub file_name: String,
}

/// Result of a capture request
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Captured {
        id: u32,
        data: Vec<u8>,
        file_name: String,
    },
    Failed {
        id: u32,
        kind: ErrorKind,
        message: String,
    },
}

impl CaptureOutcome {
    fn failed(id: u32, kind: ErrorKind, message: &str) -> Self {
        CaptureOutcome::Failed {
            id,
            kind,
            message: message.to_string(),
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            CaptureOutcome::Captured { id, .. } | CaptureOutcome::Failed { id, .. } => *id,
        }
    }
}

/// Still capture is possible in still mode while loaded or active
pub fn is_ready_for_capture(mode: CaptureModes, status: SessionStatus) -> bool {
    mode.contains(CaptureModes::STILL_IMAGE) && status.accepts_capture()
}

/// Run one still capture
///
/// `conn` is `None` when no device is open. `publish` receives the outcome as
/// soon as it is known, before the device is left to settle.
pub fn capture_photo(
    conn: Option<&mut dyn DeviceConnection>,
    mode: CaptureModes,
    status: SessionStatus,
    request: &CaptureRequest,
    config: &SessionConfig,
    mut publish: impl FnMut(CaptureOutcome),
) {
    let conn = match conn {
        Some(conn) if is_ready_for_capture(mode, status) => conn,
        _ => {
            publish(CaptureOutcome::failed(
                request.id,
                ErrorKind::NotReady,
                "Camera is not ready",
            ));
            return;
        }
    };

    info!(request_id = request.id, "Capturing still image");

    set_mirror_position(conn, MirrorPosition::Up, config);

    match conn.capture_still() {
        Err(e) => {
            warn!(request_id = request.id, error = %e, "Failed to capture frame");
            publish(CaptureOutcome::failed(
                request.id,
                ErrorKind::Resource,
                "Failed to capture frame",
            ));
        }
        Ok(path) => {
            debug!(folder = %path.folder, name = %path.name, "Captured frame");

            match conn.download(&path) {
                Err(e) => {
                    warn!(request_id = request.id, error = %e, "Failed to get file from camera");
                    publish(CaptureOutcome::failed(
                        request.id,
                        ErrorKind::Resource,
                        "Failed to download file from camera",
                    ));
                }
                Ok(data) if data.is_empty() => {
                    warn!(request_id = request.id, "Camera returned an empty file");
                    publish(CaptureOutcome::failed(
                        request.id,
                        ErrorKind::Resource,
                        "Failed to download file from camera",
                    ));
                }
                Ok(data) => {
                    debug!(request_id = request.id, size = data.len(), "Downloaded file");
                    publish(CaptureOutcome::Captured {
                        id: request.id,
                        data,
                        file_name: request.file_name.clone(),
                    });
                }
            }

            drain_events(conn, config);
        }
    }

    set_mirror_position(conn, MirrorPosition::Down, config);
}
