use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::summary::{ActionStats, DistributionRow, Summary, format_average, format_percent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub players: usize,
    pub actions: usize,
    pub player_rows: usize,
    pub total_rows: usize,
    pub setting_rows: usize,
}

pub struct ExportProgress {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

pub fn export_summary(path: &Path, summary: &Summary) -> Result<ExportReport> {
    export_summary_with_progress(path, summary, |_| {})
}

pub fn export_summary_with_progress(
    path: &Path,
    summary: &Summary,
    mut on_progress: impl FnMut(ExportProgress),
) -> Result<ExportReport> {
    let total = summary.players.len() + 2;
    let mut current = 0usize;

    let mut player_rows = vec![stats_header("Player")];
    player_rows[0].insert(1, "Action".to_string());
    for player in &summary.players {
        for action in &summary.actions {
            if let Some(stats) = summary.stats(player, action) {
                let mut row = stats_row(player, stats);
                row.insert(1, action.clone());
                player_rows.push(row);
            }
        }
        let mut row = stats_row(player, &summary.player_total(player));
        row.insert(1, "Total".to_string());
        player_rows.push(row);

        current += 1;
        on_progress(ExportProgress {
            current,
            total,
            message: format!("Player {player}"),
        });
    }

    let mut total_rows = vec![stats_header("Action")];
    for action in &summary.actions {
        if let Some(stats) = summary.action_totals.get(action) {
            total_rows.push(stats_row(action, stats));
        }
    }
    total_rows.push(stats_row("Total", &summary.grand_total));

    let mut assist_rows = vec![vec!["Setter".to_string(), "Assists".to_string()]];
    for (setter, count) in &summary.assists {
        assist_rows.push(vec![setter.clone(), count.to_string()]);
    }
    current += 1;
    on_progress(ExportProgress {
        current,
        total,
        message: "Totals".to_string(),
    });

    let position_rows = distribution_rows("Position", &summary.setting.by_position);
    let set_to_rows = distribution_rows("Set To", &summary.setting.by_player);

    let mut workbook = Workbook::new();
    for (name, rows) in [
        ("PlayerActions", &player_rows),
        ("Totals", &total_rows),
        ("Assists", &assist_rows),
        ("SettingByPosition", &position_rows),
        ("SettingByPlayer", &set_to_rows),
    ] {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        write_rows(sheet, rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    current += 1;
    on_progress(ExportProgress {
        current,
        total,
        message: "Saved".to_string(),
    });

    Ok(ExportReport {
        players: summary.players.len(),
        actions: summary.actions.len(),
        player_rows: player_rows.len().saturating_sub(1),
        total_rows: total_rows.len().saturating_sub(1),
        setting_rows: position_rows.len() + set_to_rows.len() - 2,
    })
}

fn stats_header(first: &str) -> Vec<String> {
    vec![
        first.to_string(),
        "Qty".to_string(),
        "Avg".to_string(),
        "Success %".to_string(),
        "Fail %".to_string(),
    ]
}

fn stats_row(label: &str, stats: &ActionStats) -> Vec<String> {
    vec![
        label.to_string(),
        stats.qty.to_string(),
        format_average(stats.average()),
        format_percent(stats.success_pct()),
        format_percent(stats.fail_pct()),
    ]
}

fn distribution_rows(label: &str, rows: &[DistributionRow]) -> Vec<Vec<String>> {
    let mut out = vec![vec![
        label.to_string(),
        "Count".to_string(),
        "Percent".to_string(),
    ]];
    out.extend(
        rows.iter()
            .map(|r| vec![r.key.clone(), r.count.to_string(), r.percent_label()]),
    );
    out
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::summary::aggregate;

    #[test]
    fn writes_a_workbook_for_a_demo_game() {
        let game = demo::generate(3, 1);
        let summary = aggregate(&game.events);
        let path = std::env::temp_dir().join(format!(
            "volley_review_export_{}.xlsx",
            std::process::id()
        ));
        let mut ticks = 0;
        let report = export_summary_with_progress(&path, &summary, |_| ticks += 1).unwrap();
        assert!(path.exists());
        assert_eq!(report.players, summary.players.len());
        assert_eq!(report.total_rows, summary.actions.len() + 1);
        assert_eq!(ticks, summary.players.len() + 2);
        let _ = std::fs::remove_file(&path);
    }
}
