use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use volley_review::config::AppConfig;
use volley_review::demo::DEMO_TEAM_ID;
use volley_review::export;
use volley_review::local_store::{self, SqliteStore};
use volley_review::logging;
use volley_review::postgrest::PostgrestStore;
use volley_review::store::EventStore;
use volley_review::summary::{self, GameScope, SummaryOptions, SummaryScope};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    logging::init_logging(None);

    let cfg = AppConfig::from_env();
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    let (store, default_team) = open_store(&cfg, &args)?;

    let team_id = arg_value(&args, "--team")
        .or(default_team)
        .ok_or_else(|| anyhow!("no team id; pass --team or set VOLLEY_TEAM_ID"))?;
    let scope = SummaryScope {
        games: match arg_value(&args, "--games").as_deref() {
            None | Some("scored") => GameScope::Scored,
            Some("all") => GameScope::All,
            Some(id) => GameScope::Single(id.to_string()),
        },
        set: match arg_value(&args, "--set") {
            Some(raw) => Some(
                raw.parse::<u32>()
                    .with_context(|| format!("invalid set number {raw:?}"))?,
            ),
            None => None,
        },
    };
    let setter = arg_value(&args, "--setter");
    let out = arg_value(&args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("volley_summary.xlsx"));

    let rows = summary::load_scope(store.as_ref(), &team_id, &scope)
        .with_context(|| format!("load stats from {}", store.label()))?;
    let summary = summary::aggregate_with(
        &rows,
        &SummaryOptions {
            team_id: Some(team_id.clone()),
            display_names: Default::default(),
            setter,
        },
    );
    let report = export::export_summary_with_progress(&out, &summary, |progress| {
        println!("[{}/{}] {}", progress.current, progress.total, progress.message);
    })?;

    println!("Summary export complete");
    println!("Source: {} team={team_id}", store.label());
    println!("Rows read: {}", rows.len());
    println!(
        "Players: {} Actions: {} Player rows: {} Setting rows: {}",
        report.players, report.actions, report.player_rows, report.setting_rows
    );
    println!("Workbook: {}", out.display());
    Ok(())
}

/// `--db` or a config without a team reads the practice database.
fn open_store(cfg: &AppConfig, args: &[String]) -> Result<(Arc<dyn EventStore>, Option<String>)> {
    if arg_value(args, "--db").is_none() && cfg.team_id.is_some() {
        let store: Arc<dyn EventStore> = Arc::new(PostgrestStore::from_config(cfg)?);
        return Ok((store, cfg.team_id.clone()));
    }
    let path = match arg_value(args, "--db") {
        Some(path) => PathBuf::from(path),
        None => cfg
            .db_path
            .clone()
            .or_else(local_store::default_db_path)
            .context("unable to resolve sqlite path")?,
    };
    let store: Arc<dyn EventStore> = Arc::new(SqliteStore::open(&path)?);
    Ok((store, Some(DEMO_TEAM_ID.to_string())))
}

/// `--name value` or `--name=value`.
fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}
