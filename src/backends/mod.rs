// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for tethered cameras
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Session Layer                 │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                  │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │  Device workers  │  │ Option adapter  │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! │  ┌──────────────────────────────────────┐   │
//! │  │  Device protocol (vendor/simulated)  │   │
//! │  └──────────────────────────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod camera;
