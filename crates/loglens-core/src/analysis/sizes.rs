use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const TOP_LIST_LEN: usize = 10;
// URLs below this request count are excluded from the fast list so a
// single cheap redirect does not dominate it.
const FAST_LIST_MIN_REQUESTS: u64 = 3;

/// Response-size distribution over the filtered set, plus the slow/fast
/// URL lists derived from per-URL mean sizes (the size-based latency
/// proxy: the format carries no true response time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeStats {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub top_slow: Vec<UrlMeanSize>,
    pub top_fast: Vec<UrlMeanSize>,
}

/// A URL with its request count and mean response size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlMeanSize {
    pub url: String,
    pub requests: u64,
    pub mean_bytes: f64,
}

/// A URL ranked by total bytes served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlBytes {
    pub url: String,
    pub requests: u64,
    pub bytes: u64,
}

/// Percentile by `floor(p * N)` clamped to `[0, N-1]` on the ascending
/// sorted series.
pub(crate) fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let index = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

pub(crate) fn build_size_stats(
    mut sizes: Vec<u64>,
    url_sizes: &HashMap<String, (u64, u64)>,
) -> SizeStats {
    sizes.sort_unstable();
    let total: u64 = sizes.iter().sum();
    let mean = if sizes.is_empty() {
        0.0
    } else {
        total as f64 / sizes.len() as f64
    };

    let mut by_mean: Vec<UrlMeanSize> = url_sizes
        .iter()
        .map(|(url, (requests, bytes))| UrlMeanSize {
            url: url.clone(),
            requests: *requests,
            mean_bytes: if *requests == 0 {
                0.0
            } else {
                *bytes as f64 / *requests as f64
            },
        })
        .collect();

    by_mean.sort_by(|a, b| {
        b.mean_bytes
            .total_cmp(&a.mean_bytes)
            .then_with(|| a.url.cmp(&b.url))
    });
    let top_slow: Vec<UrlMeanSize> = by_mean.iter().take(TOP_LIST_LEN).cloned().collect();

    let mut fast: Vec<UrlMeanSize> = by_mean
        .into_iter()
        .filter(|entry| entry.requests >= FAST_LIST_MIN_REQUESTS)
        .collect();
    fast.sort_by(|a, b| {
        a.mean_bytes
            .total_cmp(&b.mean_bytes)
            .then_with(|| a.url.cmp(&b.url))
    });
    fast.truncate(TOP_LIST_LEN);

    SizeStats {
        p50: percentile(&sizes, 0.50),
        p95: percentile(&sizes, 0.95),
        p99: percentile(&sizes, 0.99),
        min: sizes.first().copied().unwrap_or(0),
        max: sizes.last().copied().unwrap_or(0),
        mean,
        top_slow,
        top_fast: fast,
    }
}

pub(crate) fn build_largest_urls(url_sizes: &HashMap<String, (u64, u64)>) -> Vec<UrlBytes> {
    let mut largest: Vec<UrlBytes> = url_sizes
        .iter()
        .map(|(url, (requests, bytes))| UrlBytes {
            url: url.clone(),
            requests: *requests,
            bytes: *bytes,
        })
        .collect();
    largest.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.url.cmp(&b.url)));
    largest.truncate(TOP_LIST_LEN);
    largest
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{build_size_stats, percentile};

    #[test]
    fn percentile_uses_clamped_floor_indexing() {
        let sorted = vec![10, 20, 30, 40];
        assert_eq!(percentile(&sorted, 0.50), 30);
        assert_eq!(percentile(&sorted, 0.99), 40);
        assert_eq!(percentile(&sorted, 0.0), 10);
        assert_eq!(percentile(&[], 0.5), 0);
    }

    #[test]
    fn percentiles_are_monotone() {
        let sorted: Vec<u64> = (0..1000).collect();
        let p50 = percentile(&sorted, 0.50);
        let p95 = percentile(&sorted, 0.95);
        let p99 = percentile(&sorted, 0.99);
        assert!(p50 <= p95 && p95 <= p99);
    }

    #[test]
    fn fast_list_excludes_singletons() {
        let mut url_sizes = HashMap::new();
        url_sizes.insert("/one-off".to_string(), (1u64, 5u64));
        url_sizes.insert("/steady".to_string(), (4u64, 400u64));
        url_sizes.insert("/big".to_string(), (3u64, 30_000u64));

        let stats = build_size_stats(vec![5, 100, 100, 100, 100, 10_000, 10_000, 10_000], &url_sizes);
        assert_eq!(stats.top_slow[0].url, "/big");
        assert_eq!(stats.top_fast[0].url, "/steady");
        assert!(stats.top_fast.iter().all(|e| e.url != "/one-off"));
    }
}
