use std::collections::BTreeMap;

use serde::Serialize;

use crate::stat_event::{StatEvent, non_blank};

/// Seconds added before the earliest touch when the serve itself was not logged.
pub const SERVE_LEAD_IN: f64 = 2.0;
pub const DEFAULT_END_BUFFER: f64 = 3.0;
pub const NAVIGATION_BUFFER: f64 = 2.0;

/// A contiguous playback window for one `(set, rally_id)` group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rally {
    pub start: f64,
    pub end: f64,
    pub set: u32,
    pub rally_id: u32,
}

impl Rally {
    /// Half-open: a time exactly at `end` belongs to whatever comes next.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

struct Group<'a> {
    earliest: f64,
    last_touch: &'a StatEvent,
    last_ts: f64,
    first_action: Option<&'a str>,
    count: usize,
}

/// Group timestamped events into rally windows sorted by start.
pub fn segment(events: &[StatEvent], end_buffer: f64) -> Vec<Rally> {
    let mut groups: BTreeMap<(u32, u32), Group<'_>> = BTreeMap::new();

    for ev in events {
        let (Some(set), Some(rally_id), Some(ts)) = (ev.set, ev.rally_id, ev.timestamp) else {
            continue;
        };
        groups
            .entry((set, rally_id))
            .and_modify(|g| {
                g.earliest = g.earliest.min(ts);
                if ts > g.last_ts {
                    g.last_touch = ev;
                    g.last_ts = ts;
                }
                g.count += 1;
            })
            .or_insert_with(|| Group {
                earliest: ts,
                last_touch: ev,
                last_ts: ts,
                first_action: ev.action_type.as_deref().filter(|a| !a.trim().is_empty()),
                count: 1,
            });
    }

    let mut rallies: Vec<Rally> = groups
        .into_iter()
        .map(|((set, rally_id), g)| {
            let last_has_player = non_blank(g.last_touch.player.as_deref());
            let serve_missing = (g.count == 1 && !last_has_player)
                || (g
                    .first_action
                    .is_some_and(|a| !a.eq_ignore_ascii_case("serve"))
                    && last_has_player);

            let mut start = g.earliest - 1.0;
            if serve_missing {
                start -= SERVE_LEAD_IN;
            }

            let mut end = g.last_ts + end_buffer;
            if g.count == 1 && g.last_touch.action_type.as_deref() == Some("Serve") {
                end += 1.0;
            }

            Rally {
                start: start.max(0.0),
                end,
                set,
                rally_id,
            }
        })
        .collect();

    rallies.sort_by(|a, b| a.start.total_cmp(&b.start));
    rallies
}

pub type RalliesBySet = BTreeMap<u32, Vec<Rally>>;

/// Rally windows for one log, flat and grouped by set.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub rallies: Vec<Rally>,
    pub by_set: RalliesBySet,
}

impl Timeline {
    pub fn build(events: &[StatEvent], end_buffer: f64) -> Self {
        let rallies = segment(events, end_buffer);
        let by_set = rallies_by_set(&rallies);
        Self { rallies, by_set }
    }

    pub fn is_empty(&self) -> bool {
        self.rallies.is_empty()
    }

    pub fn sets(&self) -> Vec<u32> {
        self.by_set.keys().copied().collect()
    }

    pub fn first_of_set(&self, set: u32) -> Option<&Rally> {
        self.by_set.get(&set)?.first()
    }
}

pub fn rallies_by_set(rallies: &[Rally]) -> RalliesBySet {
    let mut out: RalliesBySet = BTreeMap::new();
    for rally in rallies {
        out.entry(rally.set).or_default().push(*rally);
    }
    for list in out.values_mut() {
        list.sort_by(|a, b| a.start.total_cmp(&b.start));
    }
    out
}

/// 1-based position of the rally inside its set. Starts can tie once
/// clamped to zero, so rallies are matched by id.
pub fn rally_number(by_set: &RalliesBySet, rally: &Rally) -> Option<usize> {
    by_set
        .get(&rally.set)?
        .iter()
        .position(|r| r.rally_id == rally.rally_id)
        .map(|i| i + 1)
}

pub fn rally_at(rallies: &[Rally], t: f64) -> Option<usize> {
    rallies.iter().position(|r| r.contains(t))
}

pub fn next_rally_start(rallies: &[Rally], t: f64) -> Option<f64> {
    rallies.iter().map(|r| r.start).find(|start| *start > t)
}

/// Rallies that began within `buffer` seconds count as "current", so going back skips them.
pub fn previous_rally_start(rallies: &[Rally], t: f64, buffer: f64) -> Option<f64> {
    rallies
        .iter()
        .rev()
        .map(|r| r.start)
        .find(|start| *start < t - buffer)
}
