//! Splits a job's total duration into fixed-size time windows.

use std::num::NonZeroU64;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("Duration of {total_duration}s needs {count} windows of {window}s, more than a job can hold")]
pub struct TooManySegments {
    pub total_duration: f64,
    pub window: u64,
    pub count: u64,
}

/// One time window of a job, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentWindow {
    pub start_time: u64,
    pub duration: u64,
    /// 1-based position of this window within the job
    pub index: u32,
    pub total: u32,
}

impl SegmentWindow {
    /// The last window is extracted "to end" instead of for a fixed duration.
    pub fn is_last(&self) -> bool {
        self.index == self.total
    }
}

/// Computes the ordered windows covering `total_duration` seconds.
///
/// Every window but the last is exactly `window` seconds long. The last one
/// covers the remainder with fractional seconds truncated, so a duration that
/// divides evenly ends with a full window rather than an empty one.
/// A zero (or non-finite, or negative) duration yields no windows. A
/// duration needing more than `u32::MAX` windows is rejected.
pub fn segment(total_duration: f64, window: NonZeroU64) -> Result<Vec<SegmentWindow>, TooManySegments> {
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return Ok(Vec::new());
    }

    let window = window.get();
    let windows = (total_duration / window as f64).ceil();
    if windows > f64::from(u32::MAX) {
        return Err(TooManySegments {
            total_duration,
            window,
            count: windows as u64,
        });
    }
    let count = windows as u64;
    let last = count - 1;

    let segments = (0..count)
        .map(|i| {
            let duration = if i != last {
                window
            } else {
                (total_duration - (last * window) as f64).trunc() as u64
            };
            SegmentWindow {
                start_time: i * window,
                duration,
                index: (i + 1) as u32,
                total: count as u32,
            }
        })
        .collect();
    Ok(segments)
}
