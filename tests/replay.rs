use std::fs::File;
use std::io::{BufReader, Write};

use tempfile::TempDir;

use trustdrift::replay::{replay, MetricsLine, ReplayLine, DEFAULT_SUBJECT};
use trustdrift::SubjectRegistry;

#[test]
fn replays_file_and_emits_metrics() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.jsonl");
    {
        let mut f = File::create(&path).unwrap();
        for i in 0..12 {
            let subject = if i % 3 == 0 { "alice" } else { "bob" };
            writeln!(
                f,
                r#"{{"subject":"{subject}","user_trust":0.9,"actual_reliability":0.6,"signals":{{"dwell_time":12.0,"reliance_ratio":0.9}}}}"#
            )
            .unwrap();
        }
        writeln!(f).unwrap();
        writeln!(f, r#"{{"user_trust":0.7,"actual_reliability":0.7,"intervention":1.0}}"#).unwrap();
    }

    let registry = SubjectRegistry::with_defaults();
    let mut out = Vec::new();
    let summary = replay(
        &registry,
        BufReader::new(File::open(&path).unwrap()),
        &mut out,
        true,
    )
    .unwrap();

    assert_eq!(summary.records, 13);
    assert_eq!(summary.subjects, 3);
    assert_eq!(summary.reactive + summary.proactive, 12);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 13 + 3);

    let first: ReplayLine = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first.subject, "alice");
    assert_eq!(first.snapshot.interaction, 1);
    assert!((first.snapshot.state.delta_trust - 0.3).abs() < 1e-12);

    let last_snapshot: ReplayLine = serde_json::from_str(lines[12]).unwrap();
    assert_eq!(last_snapshot.subject, DEFAULT_SUBJECT);
    assert_eq!(last_snapshot.snapshot.state.delta_trust, 0.0);

    let metrics: Vec<MetricsLine> = lines[13..]
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let subjects: Vec<&str> = metrics.iter().map(|m| m.subject.as_str()).collect();
    assert_eq!(subjects, vec!["alice", "bob", DEFAULT_SUBJECT]);
    assert_eq!(metrics[0].metrics.interactions, 4);
    assert_eq!(metrics[1].metrics.interactions, 8);
    assert!(!metrics[1].meets_requirements);
}

#[test]
fn replay_without_metrics_writes_only_snapshots() {
    let registry = SubjectRegistry::with_defaults();
    let input = "{\"user_trust\":0.5,\"actual_reliability\":0.5}\n{\"user_trust\":0.6,\"actual_reliability\":0.5}\n";
    let mut out = Vec::new();
    let summary = replay(&registry, input.as_bytes(), &mut out, false).unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
}
