//! Timeline reconstruction from recorded sessions.

use std::collections::{BTreeMap, HashMap};

use stepline_core::{Preset, ProcessGraph, QuotaConfig, SessionLog, Timeline};
use stepline_engine::{segment, ProgressTracker};
use tracing::{debug, warn};

/// Reconstruct the raw timeline of a recorded session.
///
/// With quota tracking enabled the session is replayed batch by batch
/// through a fresh tracker, recording the most probable step after each
/// batch. With tracking disabled the whole session is segmented offline.
pub fn raw_timeline(log: &SessionLog, preset: &Preset, quota: &QuotaConfig) -> Timeline {
    if quota.is_disabled() {
        return offline_timeline(log, preset);
    }

    let mut tracker = ProgressTracker::new(ProcessGraph::from_preset(preset));
    let mut timeline = Timeline::new();
    for (&ts, batch) in &log.observations {
        tracker.update(ts, batch, quota);
        timeline.insert(ts, tracker.most_probable_state());
    }
    timeline
}

/// Reconstruct a session's timeline by offline segmentation.
///
/// Observation labels become candidate step numbers via the graph's
/// action matching; the segmenter then assigns each timestamp to one of
/// K contiguous segments, and segment k maps back to step number k+1.
pub fn offline_timeline(log: &SessionLog, preset: &Preset) -> Timeline {
    let graph = ProcessGraph::from_preset(preset);

    let mut data: BTreeMap<i64, Vec<u32>> = BTreeMap::new();
    for (&ts, batch) in &log.observations {
        let labels: Vec<u32> = batch
            .iter()
            .flat_map(|o| graph.nodes_accepting(&o.label))
            .filter(|&n| n >= 1)
            .map(|n| n - 1)
            .collect();
        data.entry(ts).or_default().extend(labels);
    }

    let Some(boundaries) = segment(&data) else {
        warn!(
            session = %log.id,
            "session has too few timestamps to segment, skipping offline reconstruction"
        );
        return Timeline::new();
    };
    debug!(session = %log.id, boundaries = boundaries.len(), "segmented session");

    let mut timeline = Timeline::new();
    let Some(&first_ts) = data.keys().next() else {
        return timeline;
    };
    for (index, ts) in std::iter::once(first_ts)
        .chain(boundaries.iter().copied())
        .enumerate()
    {
        match graph.step(index as u32 + 1) {
            Ok(step) => {
                timeline.insert(ts, step);
            }
            Err(err) => {
                warn!(session = %log.id, %err, "skipping segment without a matching step");
            }
        }
    }
    timeline
}

/// Clean a raw timeline: re-seed the first timestamp with the
/// lowest-numbered real step ever observed, then collapse consecutive
/// entries that reference the same step.
pub fn clean(timeline: &Timeline) -> Timeline {
    let Some((&first_ts, first_step)) = timeline.iter().next() else {
        return Timeline::new();
    };
    let seed = timeline
        .values()
        .filter(|s| s.number > 0)
        .min_by_key(|s| s.number)
        .unwrap_or(first_step);

    let mut out = Timeline::new();
    out.insert(first_ts, seed.clone());
    let mut last_number = seed.number;
    for (&ts, step) in timeline.iter().skip(1) {
        if step.number != last_number {
            last_number = step.number;
            out.insert(ts, step.clone());
        }
    }
    out
}

/// Dwell time of the occurrence at `key`: time until the next distinct
/// timestamp, or until `end_ms` for the last occurrence. A negative delta
/// wraps by the first key, guarding against clock wraparound.
pub fn dwell_of(timeline: &Timeline, key: i64, end_ms: i64) -> i64 {
    let next = timeline
        .range(key + 1..)
        .next()
        .map(|(&ts, _)| ts)
        .unwrap_or(end_ms);
    let mut dwell = next - key;
    if dwell < 0 {
        dwell += timeline.keys().next().copied().unwrap_or(0);
    }
    dwell
}

/// Keep, per step number, only the occurrence with the longest dwell, and
/// re-key the surviving entries by their dwell time.
pub fn filter_by_dwell(timeline: &Timeline, duration_ms: i64) -> Timeline {
    let mut max_dwell: HashMap<u32, i64> = HashMap::new();
    for &ts in timeline.keys() {
        let step = &timeline[&ts];
        let dwell = dwell_of(timeline, ts, duration_ms);
        let entry = max_dwell.entry(step.number).or_insert(dwell);
        *entry = (*entry).max(dwell);
    }

    let mut out = Timeline::new();
    for (&ts, step) in timeline {
        let dwell = dwell_of(timeline, ts, duration_ms);
        if dwell == max_dwell[&step.number] {
            out.insert(dwell, step.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stepline_core::{Observation, QuotaMode, SessionId, StepRef, StepSpec};

    fn step(number: u32, name: &str) -> StepRef {
        StepRef {
            number,
            name: name.to_string(),
        }
    }

    fn session(preset: &str, batches: &[(i64, &[(&str, f64)])]) -> SessionLog {
        let start = chrono::Utc::now();
        let end = start + Duration::milliseconds(batches.last().map(|(ts, _)| *ts).unwrap_or(0));
        SessionLog {
            id: SessionId::new(),
            user: "tester".to_string(),
            preset_name: preset.to_string(),
            start_time: start,
            end_time: end,
            observations: batches
                .iter()
                .map(|(ts, obs)| {
                    (
                        *ts,
                        obs.iter()
                            .map(|(label, conf)| Observation::new(*label, *conf))
                            .collect(),
                    )
                })
                .collect(),
        }
    }

    fn three_step_preset() -> Preset {
        let mut preset = Preset::new("assembly");
        preset.steps.push(StepSpec::new(1, "frame", 2.0));
        preset.steps.push(StepSpec::new(2, "panel", 2.0));
        preset.steps.push(StepSpec::new(3, "inspect", 1.0));
        preset
    }

    #[test]
    fn test_offline_reconstruction_maps_segments_to_steps() {
        let preset = three_step_preset();
        let log = session(
            "assembly",
            &[
                (0, &[("frame", 1.0)]),
                (1000, &[("frame", 1.0)]),
                (2000, &[("panel", 1.0)]),
                (3000, &[("panel", 1.0)]),
                (4000, &[("inspect", 1.0)]),
            ],
        );
        let timeline = offline_timeline(&log, &preset);
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[&0].number, 1);
        assert_eq!(timeline[&2000].number, 2);
        assert_eq!(timeline[&4000].number, 3);
    }

    #[test]
    fn test_offline_skips_unknown_step_numbers() {
        let mut preset = Preset::new("gappy");
        preset.steps.push(StepSpec::new(1, "frame", 2.0));
        preset.steps.push(StepSpec::new(3, "inspect", 2.0));
        let log = session(
            "gappy",
            &[
                (0, &[("frame", 1.0)]),
                (1000, &[("frame", 1.0)]),
                (2000, &[("inspect", 1.0)]),
            ],
        );
        // Step numbering has a gap at 2, so the middle segment has no
        // matching step and is dropped instead of failing the timeline.
        let timeline = offline_timeline(&log, &preset);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[&0].number, 1);
        assert_eq!(timeline[&2000].number, 3);
    }

    #[test]
    fn test_offline_reconstruction_survives_sparse_sessions() {
        let preset = three_step_preset();
        // One timestamp cannot be split into three segments.
        let log = session("assembly", &[(0, &[("frame", 1.0)])]);
        assert!(offline_timeline(&log, &preset).is_empty());
    }

    #[test]
    fn test_disabled_mode_routes_to_offline() {
        let preset = three_step_preset();
        let quota = QuotaConfig {
            mode: QuotaMode::Disabled,
            entries: Vec::new(),
        };
        let log = session(
            "assembly",
            &[
                (0, &[("frame", 1.0)]),
                (1000, &[("panel", 1.0)]),
                (2000, &[("inspect", 1.0)]),
            ],
        );
        let timeline = raw_timeline(&log, &preset, &quota);
        assert_eq!(timeline.len(), 3);
    }

    #[test]
    fn test_online_replay_records_every_batch() {
        let preset = three_step_preset();
        let quota = QuotaConfig {
            mode: QuotaMode::Offset,
            entries: Vec::new(),
        };
        let log = session(
            "assembly",
            &[(1000, &[("frame", 1.0)]), (2000, &[("frame", 1.0)])],
        );
        let timeline = raw_timeline(&log, &preset, &quota);
        assert_eq!(timeline.len(), 2);
        assert!(timeline.values().all(|s| s.number == 1));
    }

    #[test]
    fn test_clean_reseeds_and_collapses() {
        let mut timeline = Timeline::new();
        timeline.insert(0, step(0, "Idle"));
        timeline.insert(1000, step(1, "frame"));
        timeline.insert(2000, step(1, "frame"));
        timeline.insert(3000, step(2, "panel"));
        timeline.insert(4000, step(2, "panel"));

        let cleaned = clean(&timeline);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[&0].number, 1);
        assert_eq!(cleaned[&3000].number, 2);

        // No two adjacent entries share a step number.
        let numbers: Vec<u32> = cleaned.values().map(|s| s.number).collect();
        assert!(numbers.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn test_dwell_wraps_negative_deltas() {
        let mut timeline = Timeline::new();
        timeline.insert(5000, step(1, "frame"));
        // A session whose reported duration is shorter than its last key.
        assert_eq!(dwell_of(&timeline, 5000, 3000), 3000);
    }

    #[test]
    fn test_filter_by_dwell_keeps_longest_occurrence() {
        let mut timeline = Timeline::new();
        timeline.insert(0, step(1, "frame"));
        timeline.insert(500, step(2, "panel"));
        timeline.insert(1000, step(1, "frame"));
        timeline.insert(4000, step(2, "panel"));

        let filtered = filter_by_dwell(&timeline, 8000);
        // frame: dwell 500 vs 3000 -> keep 3000; panel: 500 vs 4000 -> 4000.
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[&3000].number, 1);
        assert_eq!(filtered[&4000].number, 2);
    }

    #[test]
    fn test_filter_by_dwell_is_idempotent_on_its_output() {
        let mut timeline = Timeline::new();
        timeline.insert(0, step(1, "frame"));
        timeline.insert(1000, step(2, "panel"));
        timeline.insert(3000, step(1, "frame"));
        timeline.insert(4000, step(3, "inspect"));

        let once = filter_by_dwell(&timeline, 8000);
        assert_eq!(once[&1000].number, 1);
        assert_eq!(once[&2000].number, 2);
        assert_eq!(once[&4000].number, 3);
        let twice = filter_by_dwell(&once, 8000);
        assert_eq!(once, twice);
    }
}
