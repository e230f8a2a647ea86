/// return the forecast hours of a run, from start to end inclusive
pub fn forecast_hours(start: u32, end: u32, step: u32) -> Vec<u32> {
    if step == 0 || end < start {
        return Vec::new();
    }

    (start..=end).step_by(step as usize).collect()
}

/// 0.25 degree pressure-level file of a cycle at one forecast hour
pub fn grib_filename(cycle: u32, hour: u32) -> String {
    format!("gfs.t{:02}z.pgrb2.0p25.f{:03}", cycle, hour)
}
