//! Series paths
//!
//! A series is addressed by `<device>.<measurement>`, where the device part
//! may itself contain dots (`root.turbine.d1`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TsError};

/// Full path of one series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesPath {
    pub device: String,
    pub measurement: String,
}

impl SeriesPath {
    pub fn new(device: impl Into<String>, measurement: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            measurement: measurement.into(),
        }
    }

    /// Split a full path at its last dot
    pub fn parse(full: &str) -> Result<Self> {
        match full.rsplit_once('.') {
            Some((device, measurement)) if !device.is_empty() && !measurement.is_empty() => {
                let path = Self::new(device, measurement);
                path.validate()?;
                Ok(path)
            }
            _ => Err(TsError::InvalidArgument(format!(
                "series path must look like <device>.<measurement>: {:?}",
                full
            ))),
        }
    }

    /// Reject names that would not survive the trip through a directory name.
    ///
    /// The measurement may not contain a dot, so the last dot of
    /// [`file_name`](Self::file_name) always splits the two parts again.
    pub fn validate(&self) -> Result<()> {
        check_device(&self.device)?;
        check_component(&self.measurement, "measurement")?;
        if self.measurement.contains('.') {
            return Err(TsError::InvalidArgument(format!(
                "measurement may not contain '.': {:?}",
                self.measurement
            )));
        }
        Ok(())
    }

    /// Path rendered as a single directory name
    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SeriesPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.device, self.measurement)
    }
}

/// Check a device name: dot-separated, non-empty components, no path
/// separators. Device names double as WAL node directory names.
pub fn check_device(device: &str) -> Result<()> {
    for component in device.split('.') {
        check_component(component, "device")?;
    }
    Ok(())
}

fn check_component(name: &str, what: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return Err(TsError::InvalidArgument(format!(
            "invalid {} name component: {:?}",
            what, name
        )));
    }
    Ok(())
}
