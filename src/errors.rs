// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the keyboard pipeline
//!
//! None of these are fatal to the frame loop: calibration errors keep the
//! previous transform, persistence errors fall back to defaults, and a stale
//! sensor read reuses the previous cloud.

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for sensor reads
pub type SensorResult<T> = Result<T, SensorError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Calibration was rejected
    Calibration(CalibrationError),
    /// Transform file could not be read or written
    Persistence(PersistenceError),
    /// Depth sensor errors
    Sensor(SensorError),
    /// MIDI output errors
    Audio(String),
    /// Configuration errors
    Config(String),
    /// Generic error with message
    Other(String),
}

/// Reasons a calibration transform is refused
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// The picked points do not span a plane (coincident or collinear)
    Degenerate(&'static str),
    /// The matrix has no inverse
    Singular,
}

/// Transform persistence errors
#[derive(Debug, Clone)]
pub enum PersistenceError {
    /// File missing or not readable/writable
    Unavailable(String),
    /// File exists but does not hold a valid 4x4 matrix
    Corrupt(String),
}

/// Depth sensor errors
#[derive(Debug, Clone, PartialEq)]
pub enum SensorError {
    /// No new frame since the last read
    Stale,
    /// No depth sensor found
    NoDevice,
    /// Sensor stopped delivering frames
    Disconnected,
    /// Backend error (e.g., freedepth, replay file)
    Backend(String),
    /// Frame data has the wrong shape
    InvalidFrame(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Calibration(e) => write!(f, "Calibration error: {}", e),
            AppError::Persistence(e) => write!(f, "Persistence error: {}", e),
            AppError::Sensor(e) => write!(f, "Sensor error: {}", e),
            AppError::Audio(msg) => write!(f, "Audio error: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::Degenerate(reason) => {
                write!(f, "Degenerate calibration points: {}", reason)
            }
            CalibrationError::Singular => write!(f, "Calibration transform is not invertible"),
        }
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Unavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            PersistenceError::Corrupt(msg) => write!(f, "Corrupt transform file: {}", msg),
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Stale => write!(f, "No new depth frame available"),
            SensorError::NoDevice => write!(f, "No depth sensor found"),
            SensorError::Disconnected => write!(f, "Depth sensor disconnected"),
            SensorError::Backend(msg) => write!(f, "Backend error: {}", msg),
            SensorError::InvalidFrame(msg) => write!(f, "Invalid depth frame: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CalibrationError {}
impl std::error::Error for PersistenceError {}
impl std::error::Error for SensorError {}

// Conversions from sub-errors to AppError
impl From<CalibrationError> for AppError {
    fn from(err: CalibrationError) -> Self {
        AppError::Calibration(err)
    }
}

impl From<PersistenceError> for AppError {
    fn from(err: PersistenceError) -> Self {
        AppError::Persistence(err)
    }
}

impl From<SensorError> for AppError {
    fn from(err: SensorError) -> Self {
        AppError::Sensor(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Corrupt(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_error_wraps_into_app_error() {
        let err: AppError = CalibrationError::Degenerate("collinear").into();
        assert_eq!(
            err.to_string(),
            "Calibration error: Degenerate calibration points: collinear"
        );
    }

    #[test]
    fn test_io_error_is_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            PersistenceError::from(io),
            PersistenceError::Unavailable(_)
        ));
    }
}
