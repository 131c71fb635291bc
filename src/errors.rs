//! Error types

use std::num::{ParseFloatError, ParseIntError};

use snafu::{prelude::*, Backtrace};

/// Failure of one of the hardware services (sensor, backlight, keyboard, power).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum ServiceError {
    #[snafu(display("IO error on {path}: {source}"))]
    Io {
        path: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to parse integer from {path}: {source}"))]
    ParseInt {
        path: String,
        source: ParseIntError,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to parse float from {path}: {source}"))]
    ParseFloat {
        path: String,
        source: ParseFloatError,
        backtrace: Backtrace,
    },
    #[snafu(display("No {what} found"))]
    NoDevice { what: String, backtrace: Backtrace },
}

/// Failure of a single capture cycle.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum CaptureError {
    #[snafu(display("Sensor capture failed: {source}"))]
    Transport { source: ServiceError },
    #[snafu(display("Sensor returned no samples"))]
    NoSamples,
    #[snafu(display("Sensor returned a non-finite reading"))]
    NonFinite,
}
