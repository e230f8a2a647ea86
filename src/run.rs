//! Naming of forecast runs.
//!
//! A run is identified by its date and cycle hour. From it we derive the
//! remote directory the producer publishes into, the local directory we
//! mirror into, and one [`AcquisitionTask`] per forecast hour.

use std::path::{Path, PathBuf};

use object_store::path::Path as ObjectPath;
use url::Url;

use crate::error::{FetchError, RunSpecError};
use crate::store::parse_store_url;
use crate::utils::{forecast_hours, grib_filename};

pub const DEFAULT_REMOTE_ROOT: &str = "http://nomads.ncep.noaa.gov/pub/data/nccf/com/gfs/prod/";
pub const DEFAULT_OUTPUT_DIR: &str = "gfs_data";

/// Largest forecast hour that still renders as three digits.
pub const MAX_FORECAST_HOUR: u32 = 999;

/// One batch: a forecast run plus the range of forecast hours to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSpecification {
    year: u32,
    month: u32,
    day: u32,
    cycle: u32,
    start: u32,
    end: u32,
    step: u32,
}

impl RunSpecification {
    pub fn new(
        year: u32,
        month: u32,
        day: u32,
        cycle: u32,
        start: u32,
        end: u32,
        step: u32,
    ) -> Result<Self, RunSpecError> {
        if !(1..=12).contains(&month) {
            return Err(RunSpecError::InvalidMonth(month));
        }
        if day == 0 || day > days_in_month(year, month) {
            return Err(RunSpecError::InvalidDay { year, month, day });
        }
        if cycle > 23 {
            return Err(RunSpecError::InvalidCycle(cycle));
        }
        if step == 0 {
            return Err(RunSpecError::ZeroStep);
        }
        if end < start {
            return Err(RunSpecError::EndBeforeStart { start, end });
        }
        if end > MAX_FORECAST_HOUR {
            return Err(RunSpecError::HourOutOfRange(end));
        }

        Ok(Self {
            year,
            month,
            day,
            cycle,
            start,
            end,
            step,
        })
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// `gfs.YYYYMMDDCC`, the run directory on the producer's server.
    pub fn remote_dir_name(&self) -> String {
        format!(
            "gfs.{:04}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.cycle
        )
    }

    /// `YYYY_MM_DD_cCC`, the run directory under the output root.
    pub fn local_dir_name(&self) -> String {
        format!(
            "{:04}_{:02}_{:02}_c{:02}",
            self.year, self.month, self.day, self.cycle
        )
    }

    pub fn forecast_hours(&self) -> Vec<u32> {
        forecast_hours(self.start, self.end, self.step)
    }

    pub fn task_count(&self) -> usize {
        ((self.end - self.start) / self.step + 1) as usize
    }
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        2 if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Where runs are fetched from and stored to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    remote_root: Url,
    output_root: PathBuf,
}

impl Layout {
    pub fn new<S: AsRef<str>, P: Into<PathBuf>>(
        remote_root: S,
        output_root: P,
    ) -> Result<Self, FetchError> {
        let mut remote_root = parse_store_url(remote_root)?;
        // Url::join drops the last segment of a root without a trailing slash.
        if !remote_root.path().ends_with('/') {
            let path = format!("{}/", remote_root.path());
            remote_root.set_path(&path);
        }

        Ok(Self {
            remote_root,
            output_root: output_root.into(),
        })
    }

    pub fn remote_root(&self) -> &Url {
        &self.remote_root
    }

    pub fn remote_dir(&self, spec: &RunSpecification) -> Result<Url, FetchError> {
        Ok(self
            .remote_root
            .join(&format!("{}/", spec.remote_dir_name()))?)
    }

    pub fn local_dir(&self, spec: &RunSpecification) -> PathBuf {
        self.output_root.join(spec.local_dir_name())
    }

    /// One task per forecast hour of the run, in forecast hour order.
    pub fn tasks(&self, spec: &RunSpecification) -> Result<Vec<AcquisitionTask>, FetchError> {
        let remote_dir = self.remote_dir(spec)?;
        let local_dir = self.local_dir(spec);

        spec.forecast_hours()
            .into_iter()
            .map(|hour| -> Result<AcquisitionTask, FetchError> {
                let file_name = grib_filename(spec.cycle(), hour);
                let remote_url = remote_dir.join(&file_name)?;
                let location =
                    ObjectPath::from(format!("{}/{}", spec.remote_dir_name(), file_name));
                let local_path = local_dir.join(&file_name);
                Ok(AcquisitionTask::new(file_name, remote_url, location, local_path))
            })
            .collect()
    }
}

/// A single remote file and the local path it is mirrored to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionTask {
    file_name: String,
    remote_url: Url,
    location: ObjectPath,
    local_path: PathBuf,
}

impl AcquisitionTask {
    /// `location` is the object path relative to the store root that
    /// `remote_url` was derived from.
    pub fn new(
        file_name: String,
        remote_url: Url,
        location: ObjectPath,
        local_path: PathBuf,
    ) -> Self {
        Self {
            file_name,
            remote_url,
            location,
            local_path,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn remote_url(&self) -> &Url {
        &self.remote_url
    }

    pub fn location(&self) -> &ObjectPath {
        &self.location
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }
}
