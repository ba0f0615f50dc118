use serde::{Deserialize, Serialize};

use super::tops::CountEntry;

// Ordered by match priority: the first matching substring names the bot.
const BOT_MARKERS: [&str; 13] = [
    "bot", "crawler", "spider", "scraper", "slurp", "fetch", "python", "curl", "wget", "go-http",
    "java/", "okhttp", "headless",
];

/// Bot/human split over the filtered record set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSummary {
    pub bot_requests: u64,
    pub human_requests: u64,
    pub bot_percent: f64,
    /// Bot names ranked by request count.
    pub top_bots: Vec<CountEntry>,
}

/// Classifies a user-agent; `Some(name)` when it looks automated.
///
/// Self-identifying crawlers carry a contact URL (`+http`); those that
/// match no named marker are labelled `unknown-bot`.
pub(crate) fn classify_bot(user_agent: &str) -> Option<&'static str> {
    if user_agent.is_empty() {
        return None;
    }
    let lowered = user_agent.to_lowercase();
    for marker in BOT_MARKERS {
        if lowered.contains(marker) {
            return Some(marker);
        }
    }
    if lowered.contains("+http") {
        return Some("unknown-bot");
    }
    None
}
