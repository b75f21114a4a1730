//! Rate-limit data models and the shape validator for agent payloads.
//!
//! The agent's reply is decoded into a loose `serde_json::Value` first and
//! only promoted to a [`RateLimitWindow`] once [`validate_window`] accepts it.

use serde_json::Value;

/// Duration of the primary (5-hour) window, in minutes.
pub const EXPECTED_PRIMARY_WINDOW_MINS: u32 = 300;

/// Duration of the secondary (7-day) window, in minutes.
pub const EXPECTED_SECONDARY_WINDOW_MINS: u32 = 10080;

/// Field names the agent may use for the window duration. The app-server
/// sends `windowDurationMins`; the long form is accepted as well.
const WINDOW_DURATION_KEYS: [&str; 2] = ["windowDurationMins", "windowDurationMinutes"];

/// One rate-limit accounting window.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitWindow {
    /// Usage in percent (may be fractional).
    pub used_percent: f64,
    /// Reset time as Unix seconds, always positive.
    pub resets_at: i64,
    pub window_duration_mins: u32,
}

/// Validated result of a successful conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimits {
    pub primary: RateLimitWindow,
    pub secondary: Option<RateLimitWindow>,
}

/// Check that `raw` is a well-formed window of exactly `expected_mins`.
///
/// Returns `None` when the value is not an object, `usedPercent` is not a
/// number, `resetsAt` is not a positive number, or the declared window
/// duration differs from `expected_mins`. Never panics.
pub fn validate_window(raw: &Value, expected_mins: u32) -> Option<RateLimitWindow> {
    let obj = raw.as_object()?;

    let used_percent = obj.get("usedPercent")?.as_f64()?;

    let resets_at = obj.get("resetsAt")?;
    let resets_at = resets_at
        .as_i64()
        .or_else(|| resets_at.as_f64().map(|secs| secs as i64))?;
    if resets_at <= 0 {
        return None;
    }

    let duration = WINDOW_DURATION_KEYS
        .iter()
        .find_map(|key| obj.get(*key))?
        .as_f64()?;
    if duration != f64::from(expected_mins) {
        return None;
    }

    Some(RateLimitWindow {
        used_percent,
        resets_at,
        window_duration_mins: expected_mins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn primary(used: Value, resets: Value, window: Value) -> Value {
        json!({
            "usedPercent": used,
            "resetsAt": resets,
            "windowDurationMins": window,
        })
    }

    #[test]
    fn test_accepts_exact_primary_window() {
        let raw = primary(json!(5.4), json!(1_999_999_999), json!(300));
        assert_eq!(
            validate_window(&raw, EXPECTED_PRIMARY_WINDOW_MINS),
            Some(RateLimitWindow {
                used_percent: 5.4,
                resets_at: 1_999_999_999,
                window_duration_mins: 300,
            })
        );
    }

    #[test]
    fn test_accepts_long_duration_key() {
        let raw = json!({
            "usedPercent": 11,
            "resetsAt": 2_999_999_999u64,
            "windowDurationMinutes": 10080,
        });
        let window = validate_window(&raw, EXPECTED_SECONDARY_WINDOW_MINS).unwrap();
        assert_eq!(window.used_percent, 11.0);
        assert_eq!(window.resets_at, 2_999_999_999);
    }

    #[test]
    fn test_rejects_non_objects() {
        for raw in [json!(null), json!(42), json!("window"), json!([1, 2, 3]), json!(true)] {
            assert_eq!(validate_window(&raw, EXPECTED_PRIMARY_WINDOW_MINS), None, "{raw}");
        }
    }

    #[test]
    fn test_rejects_string_used_percent() {
        let raw = primary(json!("5.4"), json!(1_999_999_999), json!(300));
        assert_eq!(validate_window(&raw, EXPECTED_PRIMARY_WINDOW_MINS), None);
    }

    #[test]
    fn test_rejects_non_positive_resets_at() {
        for resets in [json!(0), json!(-1), json!(-1_700_000_000), json!("1999999999")] {
            let raw = primary(json!(1), resets, json!(300));
            assert_eq!(validate_window(&raw, EXPECTED_PRIMARY_WINDOW_MINS), None);
        }
    }

    #[test]
    fn test_rejects_mismatched_window_duration() {
        for window in [json!(299), json!(301), json!(10080), json!(0), json!("300"), json!(null)] {
            let raw = primary(json!(1), json!(1_999_999_999), window);
            assert_eq!(validate_window(&raw, EXPECTED_PRIMARY_WINDOW_MINS), None);
        }
    }

    #[test]
    fn test_rejects_missing_fields() {
        let raw = json!({"usedPercent": 1, "resetsAt": 1_999_999_999});
        assert_eq!(validate_window(&raw, EXPECTED_PRIMARY_WINDOW_MINS), None);

        let raw = json!({"resetsAt": 1_999_999_999, "windowDurationMins": 300});
        assert_eq!(validate_window(&raw, EXPECTED_PRIMARY_WINDOW_MINS), None);
    }

    #[test]
    fn test_float_duration_equal_to_expected_is_accepted() {
        let raw = primary(json!(0), json!(1_999_999_999), json!(300.0));
        assert!(validate_window(&raw, EXPECTED_PRIMARY_WINDOW_MINS).is_some());
    }
}
