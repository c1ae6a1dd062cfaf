// SPDX-License-Identifier: GPL-3.0-only

//! Media utilities
//!
//! - [`decoders`]: turns encoded viewfinder and still bytes into displayable frames

pub mod decoders;

pub use decoders::decode_frame;
