use std::env;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

use tracing::{info, warn};

use crate::edit;
use crate::export;
use crate::state::{Delta, ProviderCommand};
use crate::store::EventStore;
use crate::summary::{self, SummaryOptions};

/// Worker-side settings that do not change during a session.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub patch_batch: usize,
}

pub fn spawn_sync(
    store: Arc<dyn EventStore>,
    opts: SyncOptions,
    tx: Sender<Delta>,
    cmd_rx: Receiver<ProviderCommand>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let pool = build_write_pool(opts.patch_batch);
        info!(store = store.label(), batch = opts.patch_batch, "sync worker started");
        // Commands run in arrival order; the state layer already serializes edits.
        while let Ok(cmd) = cmd_rx.recv() {
            run_command(store.as_ref(), &pool, &opts, cmd, &tx);
        }
        info!("sync worker stopped");
    })
}

pub fn run_command(
    store: &dyn EventStore,
    pool: &Option<rayon::ThreadPool>,
    opts: &SyncOptions,
    cmd: ProviderCommand,
    tx: &Sender<Delta>,
) {
    match cmd {
        ProviderCommand::LoadGames { team_id } => match store.list_games(&team_id) {
            Ok(games) => {
                let _ = tx.send(Delta::SetGames { team_id, games });
            }
            Err(err) => {
                let _ = tx.send(Delta::Log(format!("[WARN] Games fetch error: {err}")));
            }
        },
        ProviderCommand::LoadEvents { game_id } => match store.list_events(&game_id) {
            Ok(events) => {
                let _ = tx.send(Delta::SetLog { game_id, events });
            }
            Err(err) => {
                let _ = tx.send(Delta::Log(format!("[WARN] Stats fetch error: {err}")));
            }
        },
        ProviderCommand::PersistEdit { seq, edit } => {
            let result =
                with_write_pool(pool, || edit::persist_edit(store, &edit, opts.patch_batch));
            let delta = match result {
                Ok(()) => Delta::EditPersisted { seq },
                Err(err) => Delta::EditFailed {
                    seq,
                    message: err.to_string(),
                    rollback: err.rollback().to_vec(),
                },
            };
            let _ = tx.send(delta);
        }
        ProviderCommand::InsertRows {
            game_id,
            after,
            rows,
        } => match store.insert_events(&rows) {
            Ok(rows) => {
                let _ = tx.send(Delta::RowsInserted {
                    game_id,
                    after,
                    rows,
                });
            }
            Err(err) => {
                warn!(error = %err, "insert failed");
                let _ = tx.send(Delta::Log(format!("[WARN] Failed to add rows: {err}")));
            }
        },
        ProviderCommand::DeleteRow { id } => match store.delete_event(&id) {
            Ok(()) => {
                let _ = tx.send(Delta::RowDeleted { id });
            }
            Err(err) => {
                warn!(row = %id, error = %err, "delete failed");
                let _ = tx.send(Delta::Log(format!("[WARN] Failed to delete row: {err}")));
            }
        },
        ProviderCommand::LoadSummary {
            team_id,
            scope,
            setter,
            display_names,
        } => match summary::load_scope(store, &team_id, &scope) {
            Ok(rows) => {
                let opts = SummaryOptions {
                    team_id: Some(team_id),
                    display_names,
                    setter,
                };
                let _ = tx.send(Delta::SetSummary(summary::aggregate_with(&rows, &opts)));
            }
            Err(err) => {
                let _ = tx.send(Delta::SummaryFailed(err.to_string()));
            }
        },
        ProviderCommand::ExportSummary { path, summary } => {
            let tx = tx.clone();
            thread::spawn(move || {
                let _ = tx.send(Delta::ExportStarted {
                    path: path.clone(),
                    total: summary.players.len() + 2,
                });
                let progress_tx = tx.clone();
                let report = export::export_summary_with_progress(
                    Path::new(&path),
                    &summary,
                    |progress| {
                        let _ = progress_tx.send(Delta::ExportProgress {
                            current: progress.current,
                            total: progress.total,
                            message: progress.message,
                        });
                    },
                );
                let _ = match report {
                    Ok(report) => tx.send(Delta::ExportFinished { path, report }),
                    Err(err) => tx.send(Delta::ExportFailed {
                        path,
                        message: format!("{err:#}"),
                    }),
                };
            });
        }
    }
}

pub fn build_write_pool(batch: usize) -> Option<rayon::ThreadPool> {
    let threads = env::var("VOLLEY_WRITE_THREADS")
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .unwrap_or(batch)
        .clamp(1, 64);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .ok()
}

fn with_write_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}
