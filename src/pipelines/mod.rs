// SPDX-License-Identifier: GPL-3.0-only

//! Capture pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │   Trigger    │ ──▶ │  Photo Pipeline   │ ──▶ │ Image bytes  │
//! │ (mirror up)  │     │  - Download       │     │ + file name  │
//! │              │     │  - Event drain    │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! Pipelines run on the device worker's thread; they block on hardware.

pub mod photo;
