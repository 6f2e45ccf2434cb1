//! Cell edits and the rally/score cascade they trigger.
//!
//! The log is ordered by `import_seq`. Within a set, a row's rally number and
//! running score follow from the rows before it: a row with a result closes
//! its rally and bumps the matching score. Editing one cell therefore
//! recomputes every later row of the same set, and the caller gets back a new
//! log together with the minimal patches needed to bring the store in line.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::edit::EditError;
use crate::stat_event::{Field, FieldKind, FieldValue, PointResult, Roster, StatEvent};

/// Field changes for one row, in the order they were produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowPatch {
    pub id: String,
    pub changes: Vec<(Field, FieldValue)>,
}

impl RowPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            changes: Vec::new(),
        }
    }

    pub fn with(mut self, field: Field, value: FieldValue) -> Self {
        self.changes.push((field, value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.changes
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
    }

    pub fn apply(&self, row: &mut StatEvent) {
        for (field, value) in &self.changes {
            row.set_value(*field, value.clone());
        }
    }

    /// JSON body for a column-level PATCH.
    pub fn to_json(&self) -> Map<String, Value> {
        self.changes
            .iter()
            .map(|(field, value)| {
                let json = serde_json::to_value(value).unwrap_or(Value::Null);
                (field.key().to_string(), json)
            })
            .collect()
    }
}

/// Apply patches by row id; patches for rows no longer present are skipped.
pub fn apply_patches(log: &[StatEvent], patches: &[RowPatch]) -> Vec<StatEvent> {
    let mut next = log.to_vec();
    for patch in patches {
        if let Some(row) = next.iter_mut().find(|r| r.id == patch.id) {
            patch.apply(row);
        }
    }
    next
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedEdit {
    pub row_id: String,
    pub field: Field,
    pub log: Vec<StatEvent>,
    /// The edited cell (plus its identity companion). Written first.
    pub primary: RowPatch,
    /// Derived changes on this and later rows.
    pub cascade: Vec<RowPatch>,
    /// Values before the edit for every field in `primary` and `cascade`.
    pub prior: Vec<RowPatch>,
}

impl AppliedEdit {
    pub fn patches(&self) -> impl Iterator<Item = &RowPatch> {
        std::iter::once(&self.primary).chain(self.cascade.iter())
    }

    /// Prior values for exactly the fields `patch` touched.
    pub fn prior_for(&self, patch: &RowPatch) -> RowPatch {
        let mut out = RowPatch::new(patch.id.clone());
        if let Some(prior) = self.prior.iter().find(|p| p.id == patch.id) {
            for (field, _) in &patch.changes {
                if let Some(value) = prior.get(*field) {
                    out.changes.push((*field, value.clone()));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// Typed value equals what is already stored.
    Unchanged,
    Applied(AppliedEdit),
}

/// Typed parse of raw cell input. Blank input clears the cell.
pub fn parse_input(field: Field, raw: &str) -> Result<FieldValue, EditError> {
    let invalid = || EditError::Validation {
        field,
        value: raw.to_string(),
    };
    if !field.is_editable() {
        return Err(invalid());
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(FieldValue::Null);
    }
    match field.kind() {
        FieldKind::Integer => {
            let v = trimmed.parse::<u32>().map_err(|_| invalid())?;
            if v == 0 && matches!(field, Field::Set | Field::RallyId) {
                return Err(invalid());
            }
            Ok(FieldValue::Int(i64::from(v)))
        }
        FieldKind::Float => {
            let v = trimmed.parse::<f64>().map_err(|_| invalid())?;
            if !v.is_finite() || (field == Field::Timestamp && v < 0.0) {
                return Err(invalid());
            }
            Ok(FieldValue::Float(v))
        }
        FieldKind::Text if field == Field::Result => Ok(PointResult::normalize(trimmed)
            .map_or(FieldValue::Null, |r| FieldValue::Text(r.label().to_string()))),
        FieldKind::Text => Ok(FieldValue::Text(trimmed.to_string())),
    }
}

fn same_value(field: Field, old: &FieldValue, new: &FieldValue) -> bool {
    if field == Field::Result {
        return PointResult::normalize(&old.display()) == PointResult::normalize(&new.display());
    }
    if matches!(field, Field::OurScore | Field::OppScore) {
        return old.as_f64() == new.as_f64();
    }
    old.display() == new.display()
}

/// Apply one cell edit and recompute everything derived from it.
pub fn apply_edit(
    log: &[StatEvent],
    row_id: &str,
    field: Field,
    raw: &str,
    roster: &Roster,
) -> Result<EditOutcome, EditError> {
    let idx = log
        .iter()
        .position(|r| r.id == row_id)
        .ok_or_else(|| EditError::RowNotFound(row_id.to_string()))?;
    let parsed = parse_input(field, raw)?;
    if same_value(field, &log[idx].value(field), &parsed) {
        return Ok(EditOutcome::Unchanged);
    }

    let mut next = log.to_vec();
    let mut primary_fields = vec![field];
    next[idx].set_value(field, parsed.clone());
    if let Some(companion) = field.identity_companion() {
        let resolved = match &parsed {
            FieldValue::Text(name) => roster.resolve(name, log),
            _ => None,
        };
        next[idx].set_value(companion, resolved.map_or(FieldValue::Null, FieldValue::Text));
        primary_fields.push(companion);
    }

    let range_end = match field {
        Field::Result => recompute_from_result(&mut next, idx),
        Field::OurScore | Field::OppScore => recompute_score(&mut next, idx, field, parsed.as_u32()),
        Field::Set => {
            let value = parsed.as_u32();
            for row in &mut next[idx..] {
                row.set = value;
            }
            next.len()
        }
        Field::RallyId => recompute_rallies(&mut next, idx, parsed.as_u32()),
        _ => idx + 1,
    };

    let mut primary = RowPatch::new(row_id);
    let mut prior_primary = RowPatch::new(row_id);
    for f in &primary_fields {
        primary.changes.push((*f, next[idx].value(*f)));
        prior_primary.changes.push((*f, log[idx].value(*f)));
    }

    let mut cascade = Vec::new();
    let mut prior = Vec::new();
    for j in idx..range_end {
        let mut patch = RowPatch::new(next[j].id.clone());
        let mut before = if j == idx {
            prior_primary.clone()
        } else {
            RowPatch::new(next[j].id.clone())
        };
        for f in Field::ALL {
            if j == idx && primary_fields.contains(&f) {
                continue;
            }
            let old = log[j].value(f);
            let new = next[j].value(f);
            if old != new {
                patch.changes.push((f, new));
                before.changes.push((f, old));
            }
        }
        if !patch.is_empty() {
            cascade.push(patch);
        }
        if !before.is_empty() {
            prior.push(before);
        }
    }

    Ok(EditOutcome::Applied(AppliedEdit {
        row_id: row_id.to_string(),
        field,
        log: next,
        primary,
        cascade,
        prior,
    }))
}

fn previous_in_set(rows: &[StatEvent], idx: usize) -> Option<&StatEvent> {
    let prev = rows.get(idx.checked_sub(1)?)?;
    (prev.set == rows[idx].set).then_some(prev)
}

/// Re-run rally numbering and both scores from `idx` to the end of its set.
fn recompute_from_result(rows: &mut [StatEvent], idx: usize) -> usize {
    let current_set = rows[idx].set;
    let (mut our, mut opp, mut rally) = match previous_in_set(rows, idx) {
        Some(prev) => {
            let mut rally = prev.rally_id.filter(|r| *r > 0).unwrap_or(1);
            if prev.ends_rally() {
                rally += 1;
            }
            (prev.our_score.unwrap_or(0), prev.opp_score.unwrap_or(0), rally)
        }
        None => (0, 0, 1),
    };

    let mut j = idx;
    while j < rows.len() && rows[j].set == current_set {
        let result = rows[j].point_result();
        match result {
            Some(PointResult::Won) => our += 1,
            Some(PointResult::Lost) => opp += 1,
            None => {}
        }
        let row = &mut rows[j];
        row.rally_id = Some(rally);
        row.our_score = Some(our);
        row.opp_score = Some(opp);
        if result.is_some() {
            rally += 1;
        }
        j += 1;
    }
    j
}

/// An explicit score overrides the running value; later rows count on from it.
fn recompute_score(rows: &mut [StatEvent], idx: usize, field: Field, typed: Option<u32>) -> usize {
    let current_set = rows[idx].set;
    let counts_on = if field == Field::OurScore {
        PointResult::Won
    } else {
        PointResult::Lost
    };
    let seed = previous_in_set(rows, idx)
        .and_then(|prev| prev.value(field).as_u32())
        .unwrap_or(0);
    let mut value = typed.unwrap_or(seed);
    rows[idx].set_value(field, FieldValue::Int(i64::from(value)));

    let mut j = idx + 1;
    while j < rows.len() && rows[j].set == current_set {
        if rows[j].point_result() == Some(counts_on) {
            value += 1;
        }
        rows[j].set_value(field, FieldValue::Int(i64::from(value)));
        j += 1;
    }
    j
}

fn recompute_rallies(rows: &mut [StatEvent], idx: usize, typed: Option<u32>) -> usize {
    let current_set = rows[idx].set;
    let mut rally = typed.unwrap_or(1);
    rows[idx].rally_id = Some(rally);

    let mut j = idx + 1;
    while j < rows.len() && rows[j].set == current_set {
        if rows[j - 1].ends_rally() {
            rally += 1;
        }
        rows[j].rally_id = Some(rally);
        j += 1;
    }
    j
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, set: u32, result: Option<&str>) -> StatEvent {
        StatEvent {
            id: id.to_string(),
            set: Some(set),
            result: result.map(str::to_string),
            ..StatEvent::default()
        }
    }

    fn applied(outcome: EditOutcome) -> AppliedEdit {
        match outcome {
            EditOutcome::Applied(edit) => edit,
            EditOutcome::Unchanged => panic!("expected an applied edit"),
        }
    }

    /// Log with consistent rally ids and scores already filled in.
    fn scored(rows: Vec<StatEvent>) -> Vec<StatEvent> {
        let mut rows = rows;
        let mut i = 0;
        while i < rows.len() {
            i = recompute_from_result(&mut rows, i);
        }
        rows
    }

    #[test]
    fn parse_rejects_bad_numbers() {
        assert!(matches!(
            parse_input(Field::OurScore, "abc"),
            Err(EditError::Validation { .. })
        ));
        assert!(parse_input(Field::Set, "0").is_err());
        assert!(parse_input(Field::ImportSeq, "3").is_err());
        assert_eq!(parse_input(Field::Quality, " ").ok(), Some(FieldValue::Null));
        assert_eq!(
            parse_input(Field::Result, "won").ok(),
            Some(FieldValue::Text("Won Point".to_string()))
        );
    }

    #[test]
    fn result_edit_renumbers_the_rest_of_the_set() {
        let log = scored(vec![
            row("a", 1, None),
            row("b", 1, None),
            row("c", 1, Some("Lost Point")),
            row("d", 1, None),
            row("e", 2, None),
        ]);
        let edit = applied(apply_edit(&log, "a", Field::Result, "w", &Roster::default()).unwrap());

        let rallies: Vec<_> = edit.log.iter().map(|r| r.rally_id).collect();
        assert_eq!(rallies, vec![Some(1), Some(2), Some(2), Some(3), Some(1)]);
        let scores: Vec<_> = edit.log.iter().map(|r| r.score()).collect();
        assert_eq!(
            scores,
            vec![Some((1, 0)), Some((1, 0)), Some((1, 1)), Some((1, 1)), Some((0, 0))]
        );
        assert_eq!(edit.primary.changes, vec![(Field::Result, FieldValue::Text("Won Point".into()))]);
        assert!(edit.cascade.iter().all(|p| p.id != "e"));
    }

    #[test]
    fn unchanged_input_is_a_no_op() {
        let log = scored(vec![row("a", 1, Some("Won Point"))]);
        let outcome = apply_edit(&log, "a", Field::Result, "WIN", &Roster::default()).unwrap();
        assert_eq!(outcome, EditOutcome::Unchanged);
    }

    #[test]
    fn retyped_cells_compare_by_their_shown_text() {
        let mut base = row("a", 1, None);
        base.quality = Some(2.0);
        base.our_score = Some(3);
        base.notes = Some("tip".to_string());
        let log = vec![base];
        let roster = Roster::default();

        for (field, raw) in [
            (Field::Quality, "2.0"),
            (Field::OurScore, "3"),
            (Field::Notes, "tip "),
        ] {
            let outcome = apply_edit(&log, "a", field, raw, &roster).unwrap();
            assert_eq!(outcome, EditOutcome::Unchanged, "{field} <- {raw:?}");
        }
        let edit = applied(apply_edit(&log, "a", Field::Quality, "2.5", &roster).unwrap());
        assert_eq!(edit.primary.changes, vec![(Field::Quality, FieldValue::Float(2.5))]);
    }

    #[test]
    fn blank_score_inherits_previous_value() {
        let log = scored(vec![
            row("a", 1, Some("Won Point")),
            row("b", 1, None),
            row("c", 1, Some("Won Point")),
        ]);
        let edit = applied(apply_edit(&log, "b", Field::OurScore, "5", &Roster::default()).unwrap());
        assert_eq!(edit.log[1].our_score, Some(5));
        assert_eq!(edit.log[2].our_score, Some(6));

        let cleared = applied(apply_edit(&edit.log, "b", Field::OurScore, "", &Roster::default()).unwrap());
        assert_eq!(cleared.log[1].our_score, Some(1));
        assert_eq!(cleared.primary.get(Field::OurScore), Some(&FieldValue::Int(1)));
    }

    #[test]
    fn set_edit_overwrites_all_later_rows() {
        let log = scored(vec![row("a", 1, None), row("b", 1, None), row("c", 2, None)]);
        let edit = applied(apply_edit(&log, "b", Field::Set, "3", &Roster::default()).unwrap());
        let sets: Vec<_> = edit.log.iter().map(|r| r.set).collect();
        assert_eq!(sets, vec![Some(1), Some(3), Some(3)]);
        assert_eq!(edit.cascade.len(), 1);
        assert_eq!(edit.cascade[0].id, "c");
    }

    #[test]
    fn missing_row_is_reported() {
        let log = scored(vec![row("a", 1, None)]);
        assert!(matches!(
            apply_edit(&log, "zz", Field::Notes, "x", &Roster::default()),
            Err(EditError::RowNotFound(_))
        ));
    }

    #[test]
    fn prior_values_restore_the_original_log() {
        let log = scored(vec![row("a", 1, None), row("b", 1, Some("Won Point"))]);
        let edit = applied(apply_edit(&log, "a", Field::Result, "l", &Roster::default()).unwrap());
        assert_eq!(apply_patches(&edit.log, &edit.prior), log);
    }
}
