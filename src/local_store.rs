use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::debug;

use crate::derive::RowPatch;
use crate::persist::cache_dir;
use crate::stat_event::{FieldValue, Game, NewStatEvent, StatEvent};
use crate::store::{EventStore, StoreError};

const STAT_COLUMNS: &str = r#"id, game_id, team_id, "set", rally_id, import_seq, timestamp,
    player, player_user_id, action_type, quality, set_to_player, set_to_user_id,
    set_to_position, result, our_score, opp_score, notes"#;

pub fn default_db_path() -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join("practice.sqlite"))
}

/// SQLite-backed store for practice mode and offline review.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("sqlite connection lock poisoned".to_string()))
    }

    pub fn upsert_game(&self, game: &Game) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO games (id, team_id, title, date, isscored, video_url)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                team_id = excluded.team_id,
                title = excluded.title,
                date = excluded.date,
                isscored = excluded.isscored,
                video_url = excluded.video_url
            "#,
            params![
                game.id,
                game.team_id,
                game.title,
                game.date,
                game.is_scored as i64,
                game.video_url
            ],
        )?;
        Ok(())
    }

    /// Replace a game's log wholesale, keeping the given ids.
    pub fn replace_events(&self, game_id: &str, events: &[StatEvent]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM stats WHERE game_id = ?1", params![game_id])?;
        for ev in events {
            insert_row(&tx, ev)?;
        }
        tx.commit()?;
        debug!(game_id, rows = events.len(), "replaced practice log");
        Ok(events.len())
    }

    pub fn game(&self, game_id: &str) -> Result<Option<Game>, StoreError> {
        let conn = self.lock()?;
        let game = conn
            .query_row(
                "SELECT id, team_id, title, date, isscored, video_url FROM games WHERE id = ?1",
                params![game_id],
                read_game,
            )
            .optional()?;
        Ok(game)
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS games (
            id TEXT PRIMARY KEY,
            team_id TEXT NOT NULL,
            title TEXT NOT NULL,
            date TEXT NULL,
            isscored INTEGER NOT NULL DEFAULT 0,
            video_url TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_team ON games(team_id);

        CREATE TABLE IF NOT EXISTS stats (
            id TEXT PRIMARY KEY,
            game_id TEXT NOT NULL,
            team_id TEXT NOT NULL,
            "set" INTEGER NULL,
            rally_id INTEGER NULL,
            import_seq REAL NOT NULL,
            timestamp REAL NULL,
            player TEXT NULL,
            player_user_id TEXT NULL,
            action_type TEXT NULL,
            quality REAL NULL,
            set_to_player TEXT NULL,
            set_to_user_id TEXT NULL,
            set_to_position TEXT NULL,
            result TEXT NULL,
            our_score INTEGER NULL,
            opp_score INTEGER NULL,
            notes TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_stats_game_seq ON stats(game_id, import_seq);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Ids for rows created locally; unique enough for a single operator.
pub fn local_id() -> String {
    format!(
        "local-{}-{:08x}",
        Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

fn read_game(row: &Row<'_>) -> rusqlite::Result<Game> {
    Ok(Game {
        id: row.get(0)?,
        team_id: row.get(1)?,
        title: row.get(2)?,
        date: row.get(3)?,
        is_scored: row.get::<_, i64>(4)? != 0,
        video_url: row.get(5)?,
    })
}

fn read_event(row: &Row<'_>) -> rusqlite::Result<StatEvent> {
    Ok(StatEvent {
        id: row.get(0)?,
        game_id: row.get(1)?,
        team_id: row.get(2)?,
        set: row.get(3)?,
        rally_id: row.get(4)?,
        import_seq: row.get(5)?,
        timestamp: row.get(6)?,
        player: row.get(7)?,
        player_user_id: row.get(8)?,
        action_type: row.get(9)?,
        quality: row.get(10)?,
        set_to_player: row.get(11)?,
        set_to_user_id: row.get(12)?,
        set_to_position: row.get(13)?,
        result: row.get(14)?,
        our_score: row.get(15)?,
        opp_score: row.get(16)?,
        notes: row.get(17)?,
    })
}

fn insert_row(conn: &Connection, ev: &StatEvent) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "INSERT INTO stats ({STAT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ),
        params![
            ev.id,
            ev.game_id,
            ev.team_id,
            ev.set,
            ev.rally_id,
            ev.import_seq,
            ev.timestamp,
            ev.player,
            ev.player_user_id,
            ev.action_type,
            ev.quality,
            ev.set_to_player,
            ev.set_to_user_id,
            ev.set_to_position,
            ev.result,
            ev.our_score,
            ev.opp_score,
            ev.notes
        ],
    )
}

fn sql_value(value: &FieldValue) -> SqlValue {
    match value {
        FieldValue::Null => SqlValue::Null,
        FieldValue::Int(v) => SqlValue::Integer(*v),
        FieldValue::Float(v) => SqlValue::Real(*v),
        FieldValue::Text(s) => SqlValue::Text(s.clone()),
    }
}

impl EventStore for SqliteStore {
    fn label(&self) -> &'static str {
        "practice"
    }

    fn list_games(&self, team_id: &str) -> Result<Vec<Game>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, team_id, title, date, isscored, video_url
             FROM games WHERE team_id = ?1 ORDER BY date DESC, id ASC",
        )?;
        let rows = stmt.query_map(params![team_id], read_game)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn list_events(&self, game_id: &str) -> Result<Vec<StatEvent>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {STAT_COLUMNS} FROM stats WHERE game_id = ?1 ORDER BY import_seq ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![game_id], read_event)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn patch_event(&self, patch: &RowPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = patch
            .changes
            .iter()
            .enumerate()
            .map(|(i, (field, _))| format!("\"{}\" = ?{}", field.key(), i + 1))
            .collect();
        let sql = format!(
            "UPDATE stats SET {} WHERE id = ?{}",
            assignments.join(", "),
            patch.changes.len() + 1
        );
        let mut values: Vec<SqlValue> = patch.changes.iter().map(|(_, v)| sql_value(v)).collect();
        values.push(SqlValue::Text(patch.id.clone()));

        let conn = self.lock()?;
        let updated = conn.execute(&sql, params_from_iter(values.iter()))?;
        if updated == 0 {
            return Err(StoreError::NotFound(patch.id.clone()));
        }
        Ok(())
    }

    fn insert_events(&self, rows: &[NewStatEvent]) -> Result<Vec<StatEvent>, StoreError> {
        let created: Vec<StatEvent> = rows
            .iter()
            .map(|row| row.clone().into_event(local_id()))
            .collect();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for ev in &created {
            insert_row(&tx, ev)?;
        }
        tx.commit()?;
        Ok(created)
    }

    fn delete_event(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM stats WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat_event::Field;

    fn new_row(seq: f64) -> NewStatEvent {
        NewStatEvent {
            game_id: "g1".to_string(),
            team_id: "t1".to_string(),
            set: Some(1),
            rally_id: Some(1),
            import_seq: seq,
            our_score: Some(0),
            opp_score: Some(0),
            ..NewStatEvent::default()
        }
    }

    #[test]
    fn insert_patch_and_delete_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.insert_events(&[new_row(2.0), new_row(1.0)]).unwrap();
        assert!(created.iter().all(|r| r.id.starts_with("local-")));

        let listed = store.list_events("g1").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].import_seq, 1.0);

        let target = listed[0].id.clone();
        let patch = RowPatch::new(target.clone())
            .with(Field::Set, FieldValue::Int(2))
            .with(Field::Result, FieldValue::Text("Won Point".to_string()))
            .with(Field::Quality, FieldValue::Float(2.5));
        store.patch_event(&patch).unwrap();
        let row = store
            .list_events("g1")
            .unwrap()
            .into_iter()
            .find(|r| r.id == target)
            .unwrap();
        assert_eq!(row.set, Some(2));
        assert_eq!(row.result.as_deref(), Some("Won Point"));
        assert_eq!(row.quality, Some(2.5));

        store.delete_event(&target).unwrap();
        assert!(matches!(
            store.delete_event(&target),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.list_events("g1").unwrap().len(), 1);
    }

    #[test]
    fn games_are_listed_per_team() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_game(&Game {
                id: "g1".to_string(),
                team_id: "t1".to_string(),
                title: "Scrimmage".to_string(),
                is_scored: true,
                ..Game::default()
            })
            .unwrap();
        assert_eq!(store.list_games("t1").unwrap().len(), 1);
        assert!(store.list_games("t2").unwrap().is_empty());
        assert_eq!(store.game("g1").unwrap().map(|g| g.title), Some("Scrimmage".to_string()));
    }
}
