// SPDX-License-Identifier: GPL-3.0-only

//! Still photo capture pipeline
//!
//! # Pipeline Stages
//!
//! 1. **Readiness**: still mode selected and device loaded or active
//! 2. **Mirror up**: flap the mirror out of the light path
//! 3. **Trigger**: the device exposes and stores a file
//! 4. **Download**: fetch the file's bytes from the device
//! 5. **Settle**: drain device events with a bounded wait
//! 6. **Mirror down**: always, even after a failed step

pub mod capture;

pub use capture::{CaptureOutcome, CaptureRequest, capture_photo, is_ready_for_capture};
