mod common;

use serde_json::json;
use volley_review::derive::RowPatch;
use volley_review::stat_event::{Field, FieldValue, Game};
use volley_review::state::bottom_block;

#[test]
fn stats_rows_accept_numeric_ids() {
    let log = common::fixture();
    assert_eq!(log.len(), 11);
    let first = &log[0];
    assert_eq!(first.id, "101");
    assert_eq!(first.game_id, "42");
    assert_eq!(first.team_id, "7");
    assert_eq!(first.quality, Some(2.0));
    assert_eq!(first.import_seq, 1.0);

    let no_identity = common::row(&log, "108");
    assert_eq!(no_identity.player_user_id, None);
    assert_eq!(no_identity.timestamp, None);
}

#[test]
fn games_read_the_scored_flag() {
    let games: Vec<Game> = serde_json::from_value(json!([
        {"id": 42, "team_id": 7, "title": "Home vs Ridgeview", "date": "2026-03-01", "isscored": true},
        {"id": "b7", "team_id": "7", "title": "Practice"}
    ]))
    .unwrap();
    assert!(games[0].is_scored);
    assert_eq!(games[0].id, "42");
    assert!(!games[1].is_scored);
    assert_eq!(games[1].date, None);
}

#[test]
fn patch_bodies_use_column_names() {
    let patch = RowPatch::new("107")
        .with(Field::Result, FieldValue::Text("Won Point".to_string()))
        .with(Field::OurScore, FieldValue::Int(2))
        .with(Field::Quality, FieldValue::Null);
    let body = serde_json::Value::Object(patch.to_json());
    assert_eq!(
        body,
        json!({"result": "Won Point", "our_score": 2, "quality": null})
    );
}

#[test]
fn inserted_rows_serialize_without_an_id() {
    let rows = bottom_block(&common::fixture(), "42", "7");
    let body = serde_json::to_value(&rows[0]).unwrap();
    assert!(body.get("id").is_none());
    assert_eq!(body["game_id"], json!("42"));
    assert_eq!(body["set"], json!(2));
    assert_eq!(body["import_seq"], json!(12.0));
}
