//! JSON fixture bodies matching `net_fetch::manifest::Manifest`'s wire shape.

use chrono::{DateTime, Utc};

/// A `latest.json` manifest body with `reference_time` and `valid_times`
/// spaced `step_hours` apart, `count` entries starting at `reference_time`.
pub fn manifest_json(reference_time: DateTime<Utc>, step_hours: i64, count: usize, variables: &[&str]) -> String {
    let valid_times: Vec<String> = (0..count)
        .map(|i| (reference_time + chrono::Duration::hours(step_hours * i as i64)).to_rfc3339())
        .collect();
    serde_json::json!({
        "reference_time": reference_time.to_rfc3339(),
        "valid_times": valid_times,
        "variables": variables,
    })
    .to_string()
}
