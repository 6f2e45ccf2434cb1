use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::AppConfig;
use crate::derive::RowPatch;
use crate::stat_event::{Game, NewStatEvent, StatEvent};
use crate::store::{EventStore, StoreError};

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Shared blocking client. The first caller's timeout wins.
pub fn http_client(timeout: Duration) -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")
    })
}

/// `EventStore` over a PostgREST-style resource API (`/games`, `/stats`).
pub struct PostgrestStore {
    base_url: String,
    client: &'static Client,
}

impl PostgrestStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Self::new(&cfg.api_url, cfg.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{resource}", self.base_url)
    }

    fn send(&self, req: RequestBuilder) -> Result<Response, StoreError> {
        let resp = req.header(ACCEPT, "application/json").send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    fn get_json<T: DeserializeOwned>(&self, resource: &str, query: &Query) -> Result<T, StoreError> {
        let resp = self.send(self.client.get(self.url(resource)).query(query))?;
        let body = resp.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// PostgREST filter pairs; reqwest does the percent-encoding.
pub type Query = Vec<(&'static str, String)>;

pub fn events_query(game_id: &str) -> Query {
    vec![
        ("game_id", format!("eq.{game_id}")),
        ("order", "import_seq.asc".to_string()),
    ]
}

pub fn events_for_games_query(game_ids: &[String]) -> Query {
    vec![
        ("game_id", format!("in.({})", game_ids.join(","))),
        ("order", "import_seq.asc".to_string()),
    ]
}

pub fn games_query(team_id: &str) -> Query {
    vec![
        ("team_id", format!("eq.{team_id}")),
        ("order", "date.desc".to_string()),
    ]
}

pub fn row_query(id: &str) -> Query {
    vec![("id", format!("eq.{id}"))]
}

impl EventStore for PostgrestStore {
    fn label(&self) -> &'static str {
        "postgrest"
    }

    fn list_games(&self, team_id: &str) -> Result<Vec<Game>, StoreError> {
        self.get_json("games", &games_query(team_id))
    }

    fn list_events(&self, game_id: &str) -> Result<Vec<StatEvent>, StoreError> {
        self.get_json("stats", &events_query(game_id))
    }

    fn list_events_for_games(&self, game_ids: &[String]) -> Result<Vec<StatEvent>, StoreError> {
        if game_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.get_json("stats", &events_for_games_query(game_ids))
    }

    fn patch_event(&self, patch: &RowPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_string(&patch.to_json())?;
        let req = self
            .client
            .patch(self.url("stats"))
            .query(&row_query(&patch.id))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        self.send(req)?;
        debug!(id = %patch.id, fields = patch.changes.len(), "patched stat row");
        Ok(())
    }

    fn insert_events(&self, rows: &[NewStatEvent]) -> Result<Vec<StatEvent>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::to_string(rows)?;
        let req = self
            .client
            .post(self.url("stats"))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=representation")
            .body(body);
        let resp = self.send(req)?;
        let text = resp.text()?;
        Ok(serde_json::from_str(&text)?)
    }

    fn delete_event(&self, id: &str) -> Result<(), StoreError> {
        self.send(
            self.client
                .delete(self.url("stats"))
                .query(&row_query(id)),
        )?;
        Ok(())
    }
}
