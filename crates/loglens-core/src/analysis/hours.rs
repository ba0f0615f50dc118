use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const WINDOW_SECONDS: i64 = 3600;
const PEAK_MIN_COUNT: u64 = 100;

/// One hour-of-day bucket. The hourly series always carries exactly 24
/// entries, indexed 0-23, even when empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourCount {
    pub hour: u8,
    pub count: u64,
}

/// A contiguous above-threshold traffic window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficPeak {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub duration_seconds: i64,
    pub count: u64,
}

pub(crate) fn build_hourly(counts: [u64; 24]) -> Vec<HourCount> {
    counts
        .iter()
        .enumerate()
        .map(|(hour, count)| HourCount {
            hour: hour as u8,
            count: *count,
        })
        .collect()
}

/// Busiest hour-of-day bucket; ties resolve to the earliest hour.
pub(crate) fn peak_hour(hourly: &[HourCount]) -> HourCount {
    hourly
        .iter()
        .copied()
        .max_by(|a, b| a.count.cmp(&b.count).then_with(|| b.hour.cmp(&a.hour)))
        .unwrap_or(HourCount { hour: 0, count: 0 })
}

/// Quietest hour-of-day bucket; ties resolve to the earliest hour.
pub(crate) fn quietest_hour(hourly: &[HourCount]) -> HourCount {
    hourly
        .iter()
        .copied()
        .min_by(|a, b| a.count.cmp(&b.count).then_with(|| a.hour.cmp(&b.hour)))
        .unwrap_or(HourCount { hour: 0, count: 0 })
}

/// Slides a one-hour window across the ordered timestamps and emits
/// windows whose count exceeds three times the hourly mean (and a floor
/// of 100 requests). Overlapping windows are merged greedily before the
/// merged span is re-counted.
pub(crate) fn detect_traffic_peaks(
    sorted_unix: &[i64],
    average_per_hour: f64,
) -> Vec<TrafficPeak> {
    if sorted_unix.is_empty() {
        return Vec::new();
    }
    let threshold = average_per_hour * 3.0;

    let mut candidates: Vec<(i64, i64)> = Vec::new();
    let mut end = 0usize;
    for (start, &ts) in sorted_unix.iter().enumerate() {
        if end < start {
            end = start;
        }
        while end < sorted_unix.len() && sorted_unix[end] < ts + WINDOW_SECONDS {
            end += 1;
        }
        let count = (end - start) as u64;
        if count >= PEAK_MIN_COUNT && count as f64 > threshold {
            candidates.push((ts, ts + WINDOW_SECONDS));
        }
    }

    let mut merged: Vec<(i64, i64)> = Vec::new();
    for (start, stop) in candidates {
        match merged.last_mut() {
            Some((_, last_stop)) if start <= *last_stop => {
                if stop > *last_stop {
                    *last_stop = stop;
                }
            }
            _ => merged.push((start, stop)),
        }
    }

    merged
        .into_iter()
        .map(|(start, stop)| {
            let count = sorted_unix
                .iter()
                .filter(|&&ts| ts >= start && ts < stop)
                .count() as u64;
            TrafficPeak {
                start: OffsetDateTime::from_unix_timestamp(start)
                    .unwrap_or(OffsetDateTime::UNIX_EPOCH),
                duration_seconds: stop - start,
                count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{HourCount, build_hourly, detect_traffic_peaks, peak_hour, quietest_hour};

    #[test]
    fn hourly_series_has_24_buckets() {
        let hourly = build_hourly([0; 24]);
        assert_eq!(hourly.len(), 24);
        assert_eq!(hourly[23].hour, 23);
    }

    #[test]
    fn peak_and_quietest_tie_break_to_earliest_hour() {
        let mut counts = [1u64; 24];
        counts[3] = 9;
        counts[7] = 9;
        counts[5] = 0;
        counts[6] = 0;
        let hourly = build_hourly(counts);
        assert_eq!(peak_hour(&hourly), HourCount { hour: 3, count: 9 });
        assert_eq!(quietest_hour(&hourly), HourCount { hour: 5, count: 0 });
    }

    #[test]
    fn burst_above_threshold_is_detected_and_merged() {
        // 150 requests within two seconds, against a 2/hour background.
        let mut timestamps: Vec<i64> = (0..150).map(|i| 1_000_000 + (i % 2)).collect();
        timestamps.push(1_200_000);
        timestamps.sort_unstable();

        let peaks = detect_traffic_peaks(&timestamps, 2.0);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].count, 150);
        assert!(peaks[0].duration_seconds >= 3600);
    }

    #[test]
    fn quiet_traffic_produces_no_peaks() {
        let timestamps: Vec<i64> = (0..50).map(|i| i * 600).collect();
        assert!(detect_traffic_peaks(&timestamps, 6.0).is_empty());
    }
}
