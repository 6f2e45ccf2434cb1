mod common;

use std::collections::HashMap;

use common::{FlakyStore, fixture};
use volley_review::summary::{
    GameScope, SummaryOptions, SummaryScope, aggregate, aggregate_with, format_average,
    format_percent, load_scope,
};

#[test]
fn per_player_action_breakdown() {
    let summary = aggregate(&fixture());
    assert_eq!(
        summary.players,
        vec!["Avery", "Blake", "Casey", "Devon", "Emery", "Finley", "Harper"]
    );
    assert_eq!(summary.actions, vec!["Dig", "Hit", "Pass", "Serve", "Set"]);

    let serve = summary.stats("Avery", "Serve").unwrap();
    assert_eq!(serve.qty, 3);
    assert_eq!(format_average(serve.average()), "1.50");
    assert_eq!(format_percent(serve.success_pct()), "-");

    let pass = summary.stats("Blake", "Pass").unwrap();
    assert_eq!(pass.qty, 2);
    assert_eq!(format_percent(pass.fail_pct()), "50.0%");

    let hit = summary.action_totals.get("Hit").unwrap();
    assert_eq!((hit.qty, hit.won), (2, 2));
    assert_eq!(summary.grand_total.qty, 11);
}

#[test]
fn assists_and_setting_distribution() {
    let summary = aggregate(&fixture());
    assert_eq!(summary.assists.get("Casey"), Some(&2));
    assert_eq!(summary.total_assists(), 2);
    assert_eq!(summary.setters, vec!["Casey"]);

    let positions: Vec<(&str, u32)> = summary
        .setting
        .by_position
        .iter()
        .map(|r| (r.key.as_str(), r.count))
        .collect();
    assert_eq!(positions, vec![("Power", 1), ("Opposite", 1)]);
    assert_eq!(summary.setting.by_position[0].percent_label(), "50.0%");

    let targets: Vec<&str> = summary
        .setting
        .by_player
        .iter()
        .map(|r| r.key.as_str())
        .collect();
    assert_eq!(targets, vec!["Devon", "Harper"]);
}

#[test]
fn display_names_follow_identity_ids() {
    let opts = SummaryOptions {
        team_id: Some("7".to_string()),
        display_names: HashMap::from([("u1".to_string(), "Avery Quinn".to_string())]),
        setter: None,
    };
    let summary = aggregate_with(&fixture(), &opts);
    assert_eq!(summary.stats("Avery Quinn", "Serve").map(|s| s.qty), Some(2));
    // The row without an identity keeps its typed name.
    assert_eq!(summary.stats("Avery", "Serve").map(|s| s.qty), Some(1));
}

#[test]
fn other_teams_and_setters_are_scoped_out() {
    let other_team = aggregate_with(
        &fixture(),
        &SummaryOptions {
            team_id: Some("8".to_string()),
            ..SummaryOptions::default()
        },
    );
    assert!(other_team.players.is_empty());
    assert_eq!(format_average(other_team.grand_total.average()), "-");

    let nobody = aggregate_with(
        &fixture(),
        &SummaryOptions {
            setter: Some("Blake".to_string()),
            ..SummaryOptions::default()
        },
    );
    assert_eq!(nobody.setting.total, 0);
    assert_eq!(nobody.setters, vec!["Casey"]);
}

#[test]
fn scope_loads_scored_games_and_one_set() {
    let store = FlakyStore::default();
    let rows = load_scope(
        &store,
        "7",
        &SummaryScope {
            games: GameScope::Scored,
            set: Some(2),
        },
    )
    .unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.set == Some(2)));

    let single = load_scope(
        &store,
        "7",
        &SummaryScope {
            games: GameScope::Single("42".to_string()),
            set: None,
        },
    )
    .unwrap();
    assert_eq!(single.len(), 11);
}
