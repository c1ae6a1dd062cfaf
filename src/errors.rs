// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the tethered camera session

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Device protocol errors
    Device(DeviceError),
    /// Option tree errors
    Option(OptionError),
    /// Capture destination errors
    Storage(StorageError),
    /// Configuration errors
    Config(ConfigError),
    /// Session command errors (e.g. unknown camera index)
    Session(String),
}

/// Failures reported by the device protocol boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Device handle could not be created or bound
    OpenFailed(String),
    /// I/O with the device failed
    Io(String),
    /// Vendor library error code
    Code(i32),
}

/// Option Adapter failures
///
/// These never cross the adapter boundary as hard errors: callers turn them
/// into a logged warning and an empty result.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionError {
    /// The root configuration node could not be fetched
    RootUnavailable(DeviceError),
    /// No option with this name exists in the tree
    NotFound(String),
    /// The option's kind has no read/write mapping
    UnsupportedKind { name: String, kind: String },
    /// The value type cannot be written to this kind of option
    UnsupportedValue {
        name: String,
        kind: String,
        value_type: &'static str,
    },
    /// No choice matched the requested value
    NoMatchingChoice { name: String, requested: String },
    /// The new value was rejected by the node
    SetFailed { name: String, reason: String },
    /// The device refused the updated tree
    CommitFailed(DeviceError),
    /// The device is not open
    DeviceClosed,
}

/// Capture destination writer failures
#[derive(Debug, Clone)]
pub enum StorageError {
    /// Destination directory could not be created
    DirectoryUnavailable(String),
    /// Writing the file failed
    WriteFailed(String),
    /// The file name is not usable
    InvalidFileName(String),
}

/// Configuration loading failures
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// File could not be read
    Read(String),
    /// File content is not valid configuration
    Parse(String),
}

/// Event-level error taxonomy published by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Capture requested while the device is unavailable
    NotReady,
    /// Request-scoped device I/O failure
    Resource,
    /// Session-fatal device failure
    Camera,
    /// Option kind or value type not handled
    UnsupportedOption,
    /// Captured image could not be written to its destination
    Save,
}

impl OptionError {
    /// Event-level kind this failure is reported as
    pub fn kind(&self) -> ErrorKind {
        match self {
            OptionError::RootUnavailable(_)
            | OptionError::CommitFailed(_)
            | OptionError::DeviceClosed => ErrorKind::Resource,
            _ => ErrorKind::UnsupportedOption,
        }
    }
}

impl ErrorKind {
    /// Whether the session has to be reopened after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::Camera)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Device(e) => write!(f, "Device error: {}", e),
            AppError::Option(e) => write!(f, "Option error: {}", e),
            AppError::Storage(e) => write!(f, "Storage error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Session(msg) => write!(f, "Session error: {}", msg),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::OpenFailed(msg) => write!(f, "Unable to open camera: {}", msg),
            DeviceError::Io(msg) => write!(f, "I/O error: {}", msg),
            DeviceError::Code(code) => write!(f, "Device returned error code {}", code),
        }
    }
}

impl fmt::Display for OptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionError::RootUnavailable(e) => write!(f, "Unable to get root option: {}", e),
            OptionError::NotFound(name) => write!(f, "Unable to get option {}", name),
            OptionError::UnsupportedKind { name, kind } => {
                write!(f, "Option {} of type {} is not supported", name, kind)
            }
            OptionError::UnsupportedValue {
                name,
                kind,
                value_type,
            } => write!(
                f,
                "Value of type {} cannot be set to {} option {}",
                value_type, kind, name
            ),
            OptionError::NoMatchingChoice { name, requested } => {
                write!(f, "Can't find value matching {} for option {}", requested, name)
            }
            OptionError::SetFailed { name, reason } => {
                write!(f, "Failed to set value to option {}: {}", name, reason)
            }
            OptionError::CommitFailed(e) => write!(f, "Failed to set config to camera: {}", e),
            OptionError::DeviceClosed => write!(f, "Camera is not open"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DirectoryUnavailable(msg) => {
                write!(f, "Destination directory unavailable: {}", msg)
            }
            StorageError::WriteFailed(msg) => write!(f, "Failed to write image: {}", msg),
            StorageError::InvalidFileName(name) => write!(f, "Invalid file name: {:?}", name),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read(msg) => write!(f, "Failed to read configuration: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Failed to parse configuration: {}", msg),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotReady => write!(f, "not ready"),
            ErrorKind::Resource => write!(f, "resource error"),
            ErrorKind::Camera => write!(f, "camera error"),
            ErrorKind::UnsupportedOption => write!(f, "unsupported option"),
            ErrorKind::Save => write!(f, "save error"),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for DeviceError {}
impl std::error::Error for OptionError {}
impl std::error::Error for StorageError {}
impl std::error::Error for ConfigError {}

impl From<DeviceError> for AppError {
    fn from(err: DeviceError) -> Self {
        AppError::Device(err)
    }
}

impl From<OptionError> for AppError {
    fn from(err: OptionError) -> Self {
        AppError::Option(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::WriteFailed(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_camera_errors_are_fatal() {
        assert!(ErrorKind::Camera.is_fatal());
        assert!(!ErrorKind::NotReady.is_fatal());
        assert!(!ErrorKind::Resource.is_fatal());
        assert!(!ErrorKind::UnsupportedOption.is_fatal());
        assert!(!ErrorKind::Save.is_fatal());
    }

    #[test]
    fn test_option_error_message_names_option() {
        let err = OptionError::NoMatchingChoice {
            name: "aperture".to_string(),
            requested: "5".to_string(),
        };
        assert!(err.to_string().contains("aperture"));
    }

    #[test]
    fn test_option_error_kinds() {
        assert_eq!(OptionError::DeviceClosed.kind(), ErrorKind::Resource);
        assert_eq!(
            OptionError::NotFound("iso".to_string()).kind(),
            ErrorKind::UnsupportedOption
        );
    }

    #[test]
    fn test_io_error_converts_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let app: AppError = io.into();
        assert!(matches!(app, AppError::Storage(StorageError::WriteFailed(_))));
    }
}
