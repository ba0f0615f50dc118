use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A ranked key with its request count and share of the filtered set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountEntry {
    pub key: String,
    pub count: u64,
    pub percentage: f64,
}

/// Turns a frequency map into a deterministic top list: count descending,
/// key ascending on ties. All entries are kept; renderers decide how many
/// to display.
pub(crate) fn ranked_entries(map: HashMap<String, u64>, total: u64) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> = map
        .into_iter()
        .map(|(key, count)| CountEntry {
            key,
            count,
            percentage: percentage(count, total),
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries
}

pub(crate) fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::ranked_entries;

    #[test]
    fn ranks_by_count_then_key() {
        let mut map = HashMap::new();
        map.insert("/b".to_string(), 3u64);
        map.insert("/a".to_string(), 3u64);
        map.insert("/c".to_string(), 5u64);

        let ranked = ranked_entries(map, 11);
        let keys: Vec<&str> = ranked.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["/c", "/a", "/b"]);
        assert!((ranked[0].percentage - 45.454545).abs() < 1e-4);
    }

    #[test]
    fn empty_total_yields_zero_percentages() {
        let mut map = HashMap::new();
        map.insert("x".to_string(), 0u64);
        let ranked = ranked_entries(map, 0);
        assert_eq!(ranked[0].percentage, 0.0);
    }
}
