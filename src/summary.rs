use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::stat_event::{POSITION_OPTIONS, PointResult, StatEvent, non_blank};
use crate::store::{EventStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionStats {
    pub qty: u32,
    pub quality_sum: f64,
    pub quality_count: u32,
    pub won: u32,
    pub lost: u32,
}

impl ActionStats {
    fn record(&mut self, ev: &StatEvent) {
        self.qty += 1;
        if let Some(q) = ev.quality {
            self.quality_sum += q;
            self.quality_count += 1;
        }
        match ev.point_result() {
            Some(PointResult::Won) => self.won += 1,
            Some(PointResult::Lost) => self.lost += 1,
            None => {}
        }
    }

    fn merge(&mut self, other: &ActionStats) {
        self.qty += other.qty;
        self.quality_sum += other.quality_sum;
        self.quality_count += other.quality_count;
        self.won += other.won;
        self.lost += other.lost;
    }

    pub fn average(&self) -> Option<f64> {
        (self.quality_count > 0).then(|| self.quality_sum / f64::from(self.quality_count))
    }

    pub fn success_pct(&self) -> Option<f64> {
        percent(self.won, self.qty)
    }

    pub fn fail_pct(&self) -> Option<f64> {
        percent(self.lost, self.qty)
    }
}

fn percent(count: u32, total: u32) -> Option<f64> {
    (total > 0).then(|| f64::from(count) / f64::from(total) * 100.0)
}

/// Two decimals, or `-` with no samples.
pub fn format_average(avg: Option<f64>) -> String {
    avg.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

/// One decimal with `%`; `-` when empty or it would print as 0.0.
pub fn format_percent(pct: Option<f64>) -> String {
    match pct {
        Some(v) => {
            let text = format!("{v:.1}");
            if text == "0.0" {
                "-".to_string()
            } else {
                format!("{text}%")
            }
        }
        None => "-".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionRow {
    pub key: String,
    pub count: u32,
    pub percent: f64,
}

impl DistributionRow {
    pub fn percent_label(&self) -> String {
        format!("{:.1}%", self.percent)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettingDistribution {
    pub total: u32,
    pub by_position: Vec<DistributionRow>,
    pub by_player: Vec<DistributionRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub actions: Vec<String>,
    pub players: Vec<String>,
    pub per_player: BTreeMap<String, BTreeMap<String, ActionStats>>,
    pub action_totals: BTreeMap<String, ActionStats>,
    pub grand_total: ActionStats,
    pub assists: BTreeMap<String, u32>,
    pub setters: Vec<String>,
    pub setting: SettingDistribution,
}

impl Summary {
    pub fn player_total(&self, player: &str) -> ActionStats {
        let mut total = ActionStats::default();
        if let Some(actions) = self.per_player.get(player) {
            for stats in actions.values() {
                total.merge(stats);
            }
        }
        total
    }

    pub fn stats(&self, player: &str, action: &str) -> Option<&ActionStats> {
        self.per_player.get(player)?.get(action)
    }

    pub fn total_assists(&self) -> u32 {
        self.assists.values().sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    /// Only rows logged for this team count.
    pub team_id: Option<String>,
    /// Identity id to display name; wins over the free-text name.
    pub display_names: HashMap<String, String>,
    /// Restrict the setting distribution to one setter.
    pub setter: Option<String>,
}

pub fn aggregate(log: &[StatEvent]) -> Summary {
    aggregate_with(log, &SummaryOptions::default())
}

pub fn aggregate_with(log: &[StatEvent], opts: &SummaryOptions) -> Summary {
    let rows = named_rows(log, opts);

    let mut actions: Vec<String> = rows
        .iter()
        .filter_map(|r| r.action_type.clone())
        .filter(|a| !a.trim().is_empty())
        .collect();
    actions.sort_by_key(|a| a.to_lowercase());
    actions.dedup();

    let mut per_player: BTreeMap<String, BTreeMap<String, ActionStats>> = BTreeMap::new();
    for row in &rows {
        let Some(action) = row.action_type.as_deref().filter(|a| !a.trim().is_empty()) else {
            continue;
        };
        let player = row.player.clone().unwrap_or_default();
        per_player
            .entry(player)
            .or_default()
            .entry(action.to_string())
            .or_default()
            .record(row);
    }

    let mut action_totals: BTreeMap<String, ActionStats> = BTreeMap::new();
    let mut grand_total = ActionStats::default();
    for actions_of in per_player.values() {
        for (action, stats) in actions_of {
            action_totals.entry(action.clone()).or_default().merge(stats);
            grand_total.merge(stats);
        }
    }

    let mut players: Vec<String> = per_player.keys().cloned().collect();
    players.sort_by_key(|p| p.to_lowercase());

    let setting_rows: Vec<&StatEvent> = rows
        .iter()
        .filter(|r| non_blank(r.set_to_position.as_deref()) || non_blank(r.set_to_player.as_deref()))
        .collect();
    let mut setters: Vec<String> = setting_rows
        .iter()
        .filter_map(|r| r.player.clone())
        .collect();
    setters.sort_by_key(|p| p.to_lowercase());
    setters.dedup();

    Summary {
        actions,
        players,
        per_player,
        action_totals,
        grand_total,
        assists: count_assists(&rows),
        setters,
        setting: setting_distribution(&setting_rows, opts.setter.as_deref()),
    }
}

/// Rows with a player, restricted to the team, with identity names applied,
/// in game/set/sequence order.
fn named_rows(log: &[StatEvent], opts: &SummaryOptions) -> Vec<StatEvent> {
    let name_for = |id: Option<&str>, fallback: Option<&String>| -> Option<String> {
        id.and_then(|id| opts.display_names.get(id).cloned())
            .or_else(|| fallback.cloned())
    };
    let mut rows: Vec<StatEvent> = log
        .iter()
        .filter(|r| r.player.is_some())
        .filter(|r| opts.team_id.as_deref().is_none_or(|team| r.team_id == team))
        .map(|r| {
            let mut row = r.clone();
            row.player = name_for(r.player_user_id.as_deref(), r.player.as_ref());
            row.set_to_player = name_for(r.set_to_user_id.as_deref(), r.set_to_player.as_ref());
            row
        })
        .collect();
    rows.sort_by(|a, b| {
        a.game_id
            .cmp(&b.game_id)
            .then(a.set.unwrap_or(0).cmp(&b.set.unwrap_or(0)))
            .then(a.import_seq.total_cmp(&b.import_seq))
            .then(a.id.cmp(&b.id))
    });
    rows
}

/// A set immediately followed, in the same game and rally, by a won point.
fn count_assists(rows: &[StatEvent]) -> BTreeMap<String, u32> {
    let mut by_game: BTreeMap<&str, Vec<&StatEvent>> = BTreeMap::new();
    for row in rows {
        by_game.entry(row.game_id.as_str()).or_default().push(row);
    }
    let mut assists = BTreeMap::new();
    for game_rows in by_game.values_mut() {
        game_rows.sort_by(|a, b| a.import_seq.total_cmp(&b.import_seq));
        for pair in game_rows.windows(2) {
            let (curr, next) = (pair[0], pair[1]);
            if curr.is_set_action()
                && curr.has_player()
                && curr.rally_id == next.rally_id
                && next.point_result() == Some(PointResult::Won)
            {
                let name = curr.player.clone().unwrap_or_default();
                *assists.entry(name).or_insert(0) += 1;
            }
        }
    }
    assists
}

fn setting_distribution(rows: &[&StatEvent], setter: Option<&str>) -> SettingDistribution {
    let scoped: Vec<&StatEvent> = rows
        .iter()
        .copied()
        .filter(|r| setter.is_none_or(|s| r.player.as_deref() == Some(s)))
        .collect();
    let total = scoped.len() as u32;

    let count = |key: fn(&StatEvent) -> Option<&str>| {
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for row in &scoped {
            if let Some(k) = key(*row).filter(|k| !k.trim().is_empty()) {
                *counts.entry(k.to_string()).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .map(|(key, count)| DistributionRow {
                key,
                count,
                percent: percent(count, total).unwrap_or(0.0),
            })
            .collect::<Vec<_>>()
    };

    let mut by_position = count(|r| r.set_to_position.as_deref());
    by_position.sort_by_key(|row| {
        POSITION_OPTIONS
            .iter()
            .position(|p| p.eq_ignore_ascii_case(&row.key))
            .unwrap_or(POSITION_OPTIONS.len())
    });
    let mut by_player = count(|r| r.set_to_player.as_deref());
    by_player.sort_by_key(|row| row.key.to_lowercase());

    SettingDistribution {
        total,
        by_position,
        by_player,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameScope {
    Single(String),
    All,
    Scored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryScope {
    pub games: GameScope,
    pub set: Option<u32>,
}

impl Default for SummaryScope {
    fn default() -> Self {
        Self {
            games: GameScope::Scored,
            set: None,
        }
    }
}

/// Load the rows a summary scope covers from the store.
pub fn load_scope(
    store: &dyn EventStore,
    team_id: &str,
    scope: &SummaryScope,
) -> Result<Vec<StatEvent>, StoreError> {
    let game_ids: Vec<String> = match &scope.games {
        GameScope::Single(id) => vec![id.clone()],
        GameScope::All | GameScope::Scored => store
            .list_games(team_id)?
            .into_iter()
            .filter(|g| scope.games != GameScope::Scored || g.is_scored)
            .map(|g| g.id)
            .collect(),
    };
    if game_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut rows = store.list_events_for_games(&game_ids)?;
    if let Some(set) = scope.set {
        rows.retain(|r| r.set == Some(set));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(seq: f64, player: &str, action: &str, quality: Option<f64>, result: Option<&str>) -> StatEvent {
        StatEvent {
            id: format!("{seq}"),
            game_id: "g1".to_string(),
            team_id: "t1".to_string(),
            set: Some(1),
            rally_id: Some(1),
            import_seq: seq,
            player: Some(player.to_string()),
            action_type: Some(action.to_string()),
            quality,
            result: result.map(str::to_string),
            ..StatEvent::default()
        }
    }

    #[test]
    fn groups_by_player_and_action() {
        let log = vec![
            touch(1.0, "Alex", "Serve", Some(3.0), None),
            touch(2.0, "Alex", "Serve", Some(2.0), Some("Won Point")),
            touch(3.0, "Sam", "Pass", None, Some("Lost Point")),
        ];
        let summary = aggregate(&log);

        assert_eq!(summary.actions, vec!["Pass".to_string(), "Serve".to_string()]);
        let serve = summary.stats("Alex", "Serve").unwrap();
        assert_eq!(serve.qty, 2);
        assert_eq!(format_average(serve.average()), "2.50");
        assert_eq!(format_percent(serve.success_pct()), "50.0%");
        assert_eq!(format_percent(serve.fail_pct()), "-");

        let pass = summary.stats("Sam", "Pass").unwrap();
        assert_eq!(format_average(pass.average()), "-");
        assert_eq!(summary.grand_total.qty, 3);
        assert_eq!(summary.grand_total.won, 1);
    }

    #[test]
    fn assist_needs_won_point_in_same_rally() {
        let mut next_rally = touch(4.0, "Sam", "Hit", None, Some("Won Point"));
        next_rally.rally_id = Some(2);
        let log = vec![
            touch(1.0, "Jo", "Set", None, None),
            touch(2.0, "Sam", "Hit", None, Some("won point")),
            touch(3.0, "Jo", "Set", None, None),
            next_rally,
        ];
        let summary = aggregate(&log);
        assert_eq!(summary.assists.get("Jo"), Some(&1));
        assert_eq!(summary.total_assists(), 1);
    }

    #[test]
    fn setting_distribution_uses_filtered_total() {
        let mut a = touch(1.0, "Jo", "Set", None, None);
        a.set_to_position = Some("Middle".to_string());
        let mut b = touch(2.0, "Jo", "Set", None, None);
        b.set_to_position = Some("Power".to_string());
        b.set_to_player = Some("Sam".to_string());
        let mut c = touch(3.0, "Kim", "Set", None, None);
        c.set_to_position = Some("Power".to_string());

        let opts = SummaryOptions {
            setter: Some("Jo".to_string()),
            ..SummaryOptions::default()
        };
        let summary = aggregate_with(&[a, b, c], &opts);
        assert_eq!(summary.setters, vec!["Jo".to_string(), "Kim".to_string()]);
        assert_eq!(summary.setting.total, 2);
        let keys: Vec<_> = summary.setting.by_position.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["Power", "Middle"]);
        assert_eq!(summary.setting.by_position[0].percent_label(), "50.0%");
        assert_eq!(summary.setting.by_player[0].key, "Sam");
    }

    #[test]
    fn display_names_replace_free_text() {
        let mut row = touch(1.0, "al", "Serve", Some(1.0), None);
        row.player_user_id = Some("u1".to_string());
        let opts = SummaryOptions {
            display_names: HashMap::from([("u1".to_string(), "Alex".to_string())]),
            ..SummaryOptions::default()
        };
        let summary = aggregate_with(&[row], &opts);
        assert_eq!(summary.players, vec!["Alex".to_string()]);
    }
}
