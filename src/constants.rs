// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Consecutive preview failures tolerated before the session is closed
pub const CAPTURING_FAIL_LIMIT: u32 = 10;

/// Option toggled to flap the mirror up and down
pub const VIEWFINDER_PARAMETER: &str = "viewfinder";

/// Integer value that selects the first non-numeric choice of a radio option
///
/// Devices list automatic modes (e.g. "Auto" for ISO) next to plain numbers.
pub const AUTO_CHOICE_SENTINEL: i64 = -1;

/// Absolute tolerance when matching a floating value against radio choices
pub const CHOICE_TOLERANCE: f64 = 0.1;

/// Timing for post-operation event draining
pub mod drain {
    use super::Duration;

    /// Timeout of a single wait-for-event poll
    pub const POLL_TIMEOUT: Duration = Duration::from_millis(10);

    /// Overall bound on one drain
    pub const DEADLINE: Duration = Duration::from_secs(2);
}

/// File naming for captured stills
pub mod file_formats {
    /// Prefix of generated file names
    pub const PHOTO_PREFIX: &str = "IMG";

    /// Extension used when the caller gives no file name
    pub const DEFAULT_EXTENSION: &str = "jpg";

    /// Timestamp layout of generated file names
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
}

/// Directory name used under the user's picture and config directories
pub const APP_DIR_NAME: &str = "tethercam";

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";
