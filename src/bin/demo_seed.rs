use std::path::PathBuf;

use anyhow::{Context, Result};

use volley_review::demo;
use volley_review::local_store::{self, SqliteStore};
use volley_review::rally;

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let db_path = parse_path_arg(&args, "--db")
        .or_else(local_store::default_db_path)
        .context("unable to resolve sqlite path")?;
    let games = parse_number_arg(&args, "--games").unwrap_or(1).clamp(1, 50);
    let sets = parse_number_arg(&args, "--sets").unwrap_or(3).clamp(1, 5) as u32;
    let first_seed = parse_number_arg(&args, "--seed").unwrap_or(1);

    let store = SqliteStore::open(&db_path)?;
    println!("Practice seed");
    println!("DB: {}", db_path.display());
    for seed in first_seed..first_seed + games {
        let game = demo::generate(seed, sets);
        let rows = game.seed_into(&store)?;
        let rallies = rally::segment(&game.events, 5.0).len();
        println!(
            "{}: {} rows, {} rallies, {}",
            game.game_id(),
            rows,
            rallies,
            game.game.title
        );
    }
    Ok(())
}

fn parse_path_arg(args: &[String], name: &str) -> Option<PathBuf> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}

fn parse_number_arg(args: &[String], name: &str) -> Option<u64> {
    let prefix = format!("{name}=");
    args.iter().enumerate().find_map(|(idx, arg)| {
        let raw = match arg.strip_prefix(&prefix) {
            Some(value) => Some(value),
            None if arg == name => args.get(idx + 1).map(String::as_str),
            None => None,
        }?;
        raw.trim().parse::<u64>().ok()
    })
}
