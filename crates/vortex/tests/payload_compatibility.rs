//! Tests to verify payloads match what the collector API decodes.
//!
//! The collector reads `tenant_id` plus a nested `tracking` object with
//! snake_case keys, and `/batch` bodies as `{ "tracks": [...] }`.

use serde_json::json;
use std::collections::BTreeSet;
use vortex::{BatchedTracks, Tracking, TrackingData};

fn tracking(name: &str) -> Tracking {
    Tracking {
        tenant_id: "tenant_abc".into(),
        tracking: TrackingData {
            name: name.into(),
            value: r#"{"level":"3"}"#.into(),
            identity: "0b7a8c9e-1111-4222-8333-444455556666".into(),
            session_id: "9f1e2d3c-aaaa-4bbb-8ccc-ddddeeeeffff".into(),
            platform: "windows".into(),
            app_version: "1.0.0".into(),
            timestamp: "2024-01-28T00:00:00.000Z".into(),
        },
    }
}

#[test]
fn test_tracking_json_keys() {
    let json = serde_json::to_value(tracking("level_up")).unwrap();

    let top: BTreeSet<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(top, BTreeSet::from(["tenant_id", "tracking"]));

    let inner: BTreeSet<&str> = json["tracking"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(
        inner,
        BTreeSet::from([
            "name",
            "value",
            "identity",
            "session_id",
            "platform",
            "app_version",
            "timestamp",
        ])
    );
}

#[test]
fn test_value_stays_an_opaque_string() {
    let json = serde_json::to_value(tracking("level_up")).unwrap();

    // The collector stores value as text, never as a nested object.
    assert!(json["tracking"]["value"].is_string());
    assert_eq!(json["tracking"]["value"], r#"{"level":"3"}"#);
}

#[test]
fn test_batch_json_structure() {
    let batch = BatchedTracks::new(vec![tracking("a"), tracking("b")]);

    let json = serde_json::to_value(&batch).unwrap();

    assert_eq!(json.as_object().unwrap().len(), 1);
    assert_eq!(json["tracks"].as_array().unwrap().len(), 2);
    assert_eq!(json["tracks"][0]["tenant_id"], "tenant_abc");
    assert_eq!(json["tracks"][1]["tracking"]["name"], "b");
}

#[test]
fn test_decodes_collector_style_body() {
    let body = json!({
        "tracks": [
            {
                "tenant_id": "t1",
                "tracking": {
                    "name": "app_started",
                    "value": "",
                    "identity": "id",
                    "session_id": "s",
                    "platform": "linux",
                    "app_version": "2.0.0",
                    "timestamp": "2024-05-01T10:20:30.456Z"
                }
            }
        ]
    });

    let batch: BatchedTracks = serde_json::from_value(body).unwrap();

    assert_eq!(batch.len(), 1);
    assert_eq!(batch.tracks[0].name(), "app_started");
    assert_eq!(batch.tracks[0].tracking.app_version, "2.0.0");
}

#[test]
fn test_timestamp_is_rfc3339() {
    let t = tracking("x");
    assert!(chrono::DateTime::parse_from_rfc3339(&t.tracking.timestamp).is_ok());
}

/// Print the actual JSON for manual inspection
#[test]
fn test_print_example_payloads() {
    let batch = BatchedTracks::new(vec![tracking("level_up")]);

    let json = serde_json::to_string_pretty(&batch).unwrap();
    println!("Example BatchedTracks:\n{}", json);

    // {
    //   "tracks": [
    //     {
    //       "tenant_id": "tenant_abc",
    //       "tracking": {
    //         "name": "level_up",
    //         "value": "{\"level\":\"3\"}",
    //         "identity": "0b7a8c9e-...",
    //         "session_id": "9f1e2d3c-...",
    //         "platform": "windows",
    //         "app_version": "1.0.0",
    //         "timestamp": "2024-01-28T00:00:00.000Z"
    //       }
    //     }
    //   ]
    // }
}
