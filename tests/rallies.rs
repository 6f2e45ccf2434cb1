mod common;

use volley_review::rally::{
    Timeline, next_rally_start, previous_rally_start, rally_at, rally_number, segment,
};
use volley_review::stat_event::StatEvent;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn fixture_segments_into_three_rallies() {
    let log = common::fixture();
    let rallies = segment(&log, 3.0);
    assert_eq!(rallies.len(), 3);

    let keys: Vec<(u32, u32)> = rallies.iter().map(|r| (r.set, r.rally_id)).collect();
    assert_eq!(keys, vec![(1, 1), (1, 2), (2, 1)]);

    assert!(close(rallies[0].start, 11.0));
    assert!(close(rallies[0].end, 20.25));
    assert!(close(rallies[1].start, 29.0));
    assert!(close(rallies[1].end, 38.0));
}

#[test]
fn rally_without_a_logged_serve_gets_a_lead_in() {
    let log = common::fixture();
    let rallies = segment(&log, 3.0);
    let second_set = rallies.iter().find(|r| r.set == 2).unwrap();
    assert!(close(second_set.start, 117.0));
    assert!(close(second_set.end, 127.0));
}

#[test]
fn rows_without_timestamps_are_left_out() {
    let mut log = common::fixture();
    for row in &mut log {
        if row.set == Some(2) {
            row.timestamp = None;
        }
    }
    let rallies = segment(&log, 3.0);
    assert!(rallies.iter().all(|r| r.set == 1));
}

#[test]
fn timeline_groups_by_set_and_navigates() {
    let log = common::fixture();
    let timeline = Timeline::build(&log, 3.0);
    assert_eq!(timeline.sets(), vec![1, 2]);
    assert_eq!(timeline.by_set[&1].len(), 2);
    assert!(close(timeline.first_of_set(2).unwrap().start, 117.0));
    assert!(timeline.first_of_set(3).is_none());

    assert_eq!(rally_at(&timeline.rallies, 15.0), Some(0));
    assert_eq!(rally_at(&timeline.rallies, 25.0), None);
    assert_eq!(next_rally_start(&timeline.rallies, 15.0), Some(29.0));
    assert_eq!(next_rally_start(&timeline.rallies, 118.0), None);
    // Just after a rally starts, "previous" skips it.
    assert_eq!(previous_rally_start(&timeline.rallies, 118.5, 2.0), Some(29.0));
    assert_eq!(previous_rally_start(&timeline.rallies, 125.0, 2.0), Some(117.0));
}

#[test]
fn segmenting_twice_gives_the_same_rallies() {
    let log = common::fixture();
    assert_eq!(segment(&log, 3.0), segment(&log, 3.0));
    let timeline = Timeline::build(&log, 3.0);
    assert_eq!(timeline.rallies, segment(&log, 3.0));
}

#[test]
fn rallies_clamped_to_zero_keep_their_own_number() {
    let serve = |rally: u32, ts: f64| StatEvent {
        id: format!("r{rally}"),
        set: Some(1),
        rally_id: Some(rally),
        timestamp: Some(ts),
        player: Some("Avery".to_string()),
        action_type: Some("Serve".to_string()),
        ..StatEvent::default()
    };
    let timeline = Timeline::build(&[serve(1, 0.5), serve(2, 0.9)], 3.0);
    assert_eq!(timeline.rallies.len(), 2);
    assert!(timeline.rallies.iter().all(|r| r.start == 0.0));

    let numbers: Vec<(u32, Option<usize>)> = timeline
        .rallies
        .iter()
        .map(|r| (r.rally_id, rally_number(&timeline.by_set, r)))
        .collect();
    assert_eq!(numbers, vec![(1, Some(1)), (2, Some(2))]);
}
