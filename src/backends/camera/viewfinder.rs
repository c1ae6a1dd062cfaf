// SPDX-License-Identifier: GPL-3.0-only

//! Viewfinder pump
//!
//! One invocation grabs exactly one preview frame. The worker reschedules the
//! pump through its own command queue while the session stays active, so
//! other commands interleave with preview frames instead of waiting behind a
//! spinning loop.

use super::DeviceConnection;
use super::types::CameraFrame;
use crate::media::decode_frame;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Result of one pump iteration
#[derive(Debug)]
pub enum PumpOutcome {
    /// A frame is ready to publish
    Frame(CameraFrame),
    /// A frame was captured but a stop was requested before publishing
    Suppressed,
    /// The grab failed; carries the consecutive failure count
    Failed(u32),
    /// Too many consecutive failures, the device has to be closed
    Fatal,
}

/// Per-session viewfinder state: the reused frame buffer and failure counter
#[derive(Debug)]
pub struct ViewfinderPump {
    buffer: Vec<u8>,
    fail_count: u32,
    fail_limit: u32,
}

impl ViewfinderPump {
    pub fn new(fail_limit: u32) -> Self {
        Self {
            buffer: Vec::new(),
            fail_count: 0,
            fail_limit,
        }
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fail_count = 0;
    }

    /// Grab, decode and (unless cancelled) hand back one frame
    ///
    /// `cancel` is only consulted after the blocking grab, right before the
    /// frame would be published.
    pub fn pump(&mut self, conn: &mut dyn DeviceConnection, cancel: &AtomicBool) -> PumpOutcome {
        self.buffer.clear();

        let frame = conn
            .capture_preview(&mut self.buffer)
            .map_err(|e| e.to_string())
            .and_then(|()| decode_frame(&self.buffer));

        match frame {
            Ok(frame) => {
                self.fail_count = 0;
                if cancel.load(Ordering::SeqCst) {
                    debug!("Viewfinder stop requested, dropping frame");
                    return PumpOutcome::Suppressed;
                }
                PumpOutcome::Frame(frame)
            }
            Err(e) => {
                self.fail_count += 1;
                warn!(error = %e, failures = self.fail_count, "Failed retrieving preview");

                if self.fail_count > self.fail_limit {
                    warn!("Closing camera because of capturing fail");
                    return PumpOutcome::Fatal;
                }
                PumpOutcome::Failed(self.fail_count)
            }
        }
    }
}
