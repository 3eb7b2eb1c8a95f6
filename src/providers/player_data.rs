//! Intro/credits hints from the host's per-item metadata object.
//!
//! The object has no fixed schema. We walk it as a tree, at most
//! [`MAX_DEPTH`] levels deep, looking for keys such as `op`, `intro` or
//! `ending` whose value describes a time range, either as `[start, end]` or
//! as an object with `start`/`begin`/`from` and `end`/`finish`/`to` fields.

use crate::keywords::kind_for_label;
use crate::ranges::{Interval, SegmentRanges};
use serde_json::{Map, Value};

pub const MAX_DEPTH: usize = 3;

const START_FIELDS: [&str; 3] = ["start", "begin", "from"];
const END_FIELDS: [&str; 3] = ["end", "finish", "to"];

/// Extract candidate ranges from a host metadata object.
pub fn ranges_from_player_data(data: Option<&Value>) -> SegmentRanges {
    let mut ranges = SegmentRanges::new();
    if let Some(data) = data {
        walk(data, &mut ranges, 0);
    }
    ranges
}

fn walk(data: &Value, ranges: &mut SegmentRanges, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }

    match data {
        Value::Array(items) => {
            for item in items {
                walk(item, ranges, depth + 1);
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                // Only nested structures can describe a range or hold one.
                if !matches!(value, Value::Array(_) | Value::Object(_)) {
                    continue;
                }

                let kind = kind_for_label(&key.to_lowercase());
                match (kind, range_from_value(value)) {
                    (Some(kind), Some(range)) => ranges.push(kind, range),
                    _ => walk(value, ranges, depth + 1),
                }
            }
        }
        _ => {}
    }
}

/// Resolve `[start, end]` or `{start, end}`-shaped values.
pub fn range_from_value(value: &Value) -> Option<Interval> {
    if let Value::Array(items) = value {
        if items.len() >= 2 {
            if let (Some(start), Some(end)) = (coerce_number(&items[0]), coerce_number(&items[1])) {
                return Some(Interval::new(start, end));
            }
        }
        return None;
    }

    let map = value.as_object()?;
    let start = first_present(map, &START_FIELDS).and_then(coerce_number)?;
    let end = first_present(map, &END_FIELDS).and_then(coerce_number)?;
    Some(Interval::new(start, end))
}

/// First of `fields` that is present and not null.
fn first_present<'a>(map: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .filter_map(|f| map.get(*f))
        .find(|v| !v.is_null())
}

/// Numbers, and strings that parse as numbers. Anything else is rejected.
fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_range() {
        let data = json!({ "op": { "start": 85, "end": 145 } });
        let ranges = ranges_from_player_data(Some(&data));
        assert_eq!(ranges.intro, vec![Interval::new(85.0, 145.0)]);
        assert!(ranges.credits.is_empty());
    }

    #[test]
    fn test_array_range_and_alias_fields() {
        let data = json!({
            "Intro": [10, 70],
            "ending": { "from": "1300", "to": 1390.5 }
        });
        let ranges = ranges_from_player_data(Some(&data));
        assert_eq!(ranges.intro, vec![Interval::new(10.0, 70.0)]);
        assert_eq!(ranges.credits, vec![Interval::new(1300.0, 1390.5)]);
    }

    #[test]
    fn test_nested_ranges_are_found() {
        let data = json!({
            "movie": {
                "segments": [
                    { "opening": { "begin": 0, "finish": 90 } }
                ]
            }
        });
        let ranges = ranges_from_player_data(Some(&data));
        assert_eq!(ranges.intro, vec![Interval::new(0.0, 90.0)]);
    }

    #[test]
    fn test_depth_limit() {
        // The range sits five levels down and is never reached.
        let data = json!({ "a": { "b": { "c": { "d": { "intro": [1, 60] } } } } });
        assert!(ranges_from_player_data(Some(&data)).is_empty());
    }

    #[test]
    fn test_matching_key_without_range_is_recursed() {
        let data = json!({ "intro": { "meta": { "credits": [1300, 1400] } } });
        let ranges = ranges_from_player_data(Some(&data));
        assert!(ranges.intro.is_empty());
        assert_eq!(ranges.credits, vec![Interval::new(1300.0, 1400.0)]);
    }

    #[test]
    fn test_malformed_values_are_skipped() {
        let data = json!({
            "op": { "start": "soon", "end": 10 },
            "ed": [true, 5],
            "intro": 42,
            "credits": null
        });
        assert!(ranges_from_player_data(Some(&data)).is_empty());
        assert!(ranges_from_player_data(None).is_empty());
        assert!(ranges_from_player_data(Some(&json!("not an object"))).is_empty());
    }

    #[test]
    fn test_null_field_falls_back_to_alias() {
        let value = json!({ "start": null, "begin": 12, "end": 40 });
        assert_eq!(range_from_value(&value), Some(Interval::new(12.0, 40.0)));
    }
}
