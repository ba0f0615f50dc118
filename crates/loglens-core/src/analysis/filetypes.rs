use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-extension roll-up: request count and bytes served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTypeStat {
    pub extension: String,
    pub count: u64,
    pub bytes: u64,
}

pub(crate) const NO_EXTENSION: &str = "(none)";

/// Extension of the URL path: text after the last `.` in the final path
/// segment, lowercased. Query strings are ignored.
pub(crate) fn extension_of(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
        _ => NO_EXTENSION.to_string(),
    }
}

pub(crate) fn build_file_types(map: HashMap<String, (u64, u64)>) -> Vec<FileTypeStat> {
    let mut stats: Vec<FileTypeStat> = map
        .into_iter()
        .map(|(extension, (count, bytes))| FileTypeStat {
            extension,
            count,
            bytes,
        })
        .collect();
    stats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.extension.cmp(&b.extension))
    });
    stats
}

#[cfg(test)]
mod tests {
    use super::{NO_EXTENSION, extension_of};

    #[test]
    fn extracts_lowercased_extension() {
        assert_eq!(extension_of("/img/Logo.PNG"), "png");
        assert_eq!(extension_of("/app.min.js?v=3"), "js");
    }

    #[test]
    fn paths_without_extension() {
        assert_eq!(extension_of("/"), NO_EXTENSION);
        assert_eq!(extension_of("/api/users"), NO_EXTENSION);
        assert_eq!(extension_of("/.hidden"), NO_EXTENSION);
        assert_eq!(extension_of("/dir.v2/listing"), NO_EXTENSION);
    }
}
