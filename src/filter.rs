use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::stat_event::{Field, FieldKind, FieldValue, StatEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Contains,
    NotContains,
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    Blank,
    NotBlank,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
}

impl Operator {
    pub const TEXT: [Operator; 8] = [
        Operator::Contains,
        Operator::NotContains,
        Operator::Equals,
        Operator::NotEquals,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Blank,
        Operator::NotBlank,
    ];

    pub const NUMBER: [Operator; 9] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Between,
        Operator::Blank,
        Operator::NotBlank,
    ];

    pub fn for_kind(kind: FieldKind) -> &'static [Operator] {
        if kind.is_numeric() {
            &Self::NUMBER
        } else {
            &Self::TEXT
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Operator::Contains => "contains",
            Operator::NotContains => "does not contain",
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::StartsWith => "starts with",
            Operator::EndsWith => "ends with",
            Operator::Blank => "is blank",
            Operator::NotBlank => "is not blank",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Between => "between",
        }
    }

    fn ignores_value(self) -> bool {
        matches!(self, Operator::Blank | Operator::NotBlank)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Single(String),
    Range { min: String, max: String },
}

impl Default for ConditionValue {
    fn default() -> Self {
        ConditionValue::Single(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub operator: Operator,
    #[serde(default)]
    pub value: ConditionValue,
    /// How this condition joins the ones before it. Ignored on the first.
    #[serde(default)]
    pub logic: Option<Logic>,
}

impl Condition {
    pub fn new(operator: Operator, value: impl Into<String>) -> Self {
        Self {
            operator,
            value: ConditionValue::Single(value.into()),
            logic: None,
        }
    }

    pub fn between(min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            operator: Operator::Between,
            value: ConditionValue::Range {
                min: min.into(),
                max: max.into(),
            },
            logic: None,
        }
    }

    pub fn or(mut self) -> Self {
        self.logic = Some(Logic::Or);
        self
    }

    pub fn and(mut self) -> Self {
        self.logic = Some(Logic::And);
        self
    }

    /// Blank/not-blank always count; anything else needs a value.
    pub fn is_active(&self) -> bool {
        if self.operator.ignores_value() {
            return true;
        }
        match &self.value {
            ConditionValue::Single(v) => !v.is_empty(),
            ConditionValue::Range { min, max } => {
                !min.trim().is_empty() || !max.trim().is_empty()
            }
        }
    }

    fn single(&self) -> &str {
        match &self.value {
            ConditionValue::Single(v) => v,
            ConditionValue::Range { .. } => "",
        }
    }

    fn eval_text(&self, cell: &FieldValue) -> bool {
        let cell = cell.filter_text();
        let v = self.single().to_lowercase();
        match self.operator {
            Operator::Contains => cell.contains(&v),
            Operator::NotContains => !cell.contains(&v),
            Operator::Equals => cell == v,
            Operator::NotEquals => cell != v,
            Operator::StartsWith => cell.starts_with(&v),
            Operator::EndsWith => cell.ends_with(&v),
            Operator::Blank => cell.trim().is_empty(),
            Operator::NotBlank => !cell.trim().is_empty(),
            _ => true,
        }
    }

    fn eval_number(&self, cell: &FieldValue) -> bool {
        let missing = matches!(cell, FieldValue::Null)
            || matches!(cell, FieldValue::Text(s) if s.is_empty());
        match self.operator {
            Operator::Blank => return missing,
            Operator::NotBlank => return !missing,
            _ if missing => return false,
            _ => {}
        }
        let Some(n) = cell.as_f64() else {
            return false;
        };
        if self.operator == Operator::Between {
            let ConditionValue::Range { min, max } = &self.value else {
                return false;
            };
            let lo = parse_bound(min);
            let hi = parse_bound(max);
            return match (lo, hi) {
                (Bound::Invalid, _) | (_, Bound::Invalid) => false,
                (lo, hi) => lo.at_most(n) && hi.at_least(n),
            };
        }
        let Some(v) = parse_number(self.single()) else {
            return false;
        };
        match self.operator {
            Operator::Equals => n == v,
            Operator::NotEquals => n != v,
            Operator::Gt => n > v,
            Operator::Gte => n >= v,
            Operator::Lt => n < v,
            Operator::Lte => n <= v,
            _ => false,
        }
    }
}

enum Bound {
    Open,
    At(f64),
    Invalid,
}

impl Bound {
    fn at_most(&self, n: f64) -> bool {
        match self {
            Bound::Open => true,
            Bound::At(v) => *v <= n,
            Bound::Invalid => false,
        }
    }

    fn at_least(&self, n: f64) -> bool {
        match self {
            Bound::Open => true,
            Bound::At(v) => *v >= n,
            Bound::Invalid => false,
        }
    }
}

fn parse_bound(raw: &str) -> Bound {
    if raw.trim().is_empty() {
        return Bound::Open;
    }
    parse_number(raw).map_or(Bound::Invalid, Bound::At)
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub conditions: Vec<Condition>,
}

impl ColumnFilter {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn is_active(&self) -> bool {
        self.conditions.iter().any(Condition::is_active)
    }

    /// Left fold over active conditions, seeded by the first one.
    pub fn matches(&self, field: Field, row: &StatEvent) -> bool {
        let cell = row.value(field);
        let numeric = field.kind().is_numeric();
        let mut result: Option<bool> = None;
        for cond in self.conditions.iter().filter(|c| c.is_active()) {
            let hit = if numeric {
                cond.eval_number(&cell)
            } else {
                cond.eval_text(&cell)
            };
            result = Some(match result {
                None => hit,
                Some(acc) => match cond.logic.unwrap_or_default() {
                    Logic::And => acc && hit,
                    Logic::Or => acc || hit,
                },
            });
        }
        result.unwrap_or(true)
    }
}

pub type FilterSet = BTreeMap<Field, ColumnFilter>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortConfig {
    pub field: Field,
    pub direction: SortDirection,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            field: Field::ImportSeq,
            direction: SortDirection::Asc,
        }
    }
}

impl SortConfig {
    /// Header click cycle: ascending, descending, then back to log order.
    pub fn cycle(self, field: Field) -> Self {
        if self.field != field {
            return Self {
                field,
                direction: SortDirection::Asc,
            };
        }
        match self.direction {
            SortDirection::Asc => Self {
                field,
                direction: SortDirection::Desc,
            },
            SortDirection::Desc => Self::default(),
        }
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.display().cmp(&b.display()),
        },
    }
}

/// Stable sort; nulls sink to the bottom in either direction.
pub fn sort_rows(rows: &mut [StatEvent], sort: SortConfig) {
    rows.sort_by(|a, b| {
        let av = a.value(sort.field);
        let bv = b.value(sort.field);
        match (av.is_null(), bv.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = compare_values(&av, &bv);
                match sort.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        }
    });
}

pub fn filter_rows<'a>(log: &'a [StatEvent], filters: &FilterSet) -> Vec<&'a StatEvent> {
    log.iter()
        .filter(|row| filters.iter().all(|(field, f)| f.matches(*field, row)))
        .collect()
}

/// Filter then sort. Pure; the log is not touched.
pub fn project(log: &[StatEvent], filters: &FilterSet, sort: SortConfig) -> Vec<StatEvent> {
    let mut rows: Vec<StatEvent> = filter_rows(log, filters).into_iter().cloned().collect();
    sort_rows(&mut rows, sort);
    rows
}

/// Everything the grid needs to turn the log into visible rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    #[serde(default)]
    pub filters: FilterSet,
    #[serde(default)]
    pub sort: SortConfig,
    pub visible: BTreeSet<Field>,
    #[serde(skip)]
    pub frozen: Option<Vec<String>>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            filters: FilterSet::new(),
            sort: SortConfig::default(),
            visible: Field::GRID.into_iter().collect(),
            frozen: None,
        }
    }
}

impl ViewState {
    pub fn is_filtered(&self) -> bool {
        self.filters.values().any(ColumnFilter::is_active)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// Rows with a value in at least one visible column that pass every filter.
    pub fn base_rows<'a>(&self, log: &'a [StatEvent]) -> Vec<&'a StatEvent> {
        log.iter()
            .filter(|row| self.has_visible_data(row))
            .filter(|row| self.filters.iter().all(|(field, f)| f.matches(*field, row)))
            .collect()
    }

    pub fn rows(&self, log: &[StatEvent]) -> Vec<StatEvent> {
        let mut rows: Vec<StatEvent> = match &self.frozen {
            Some(ids) => {
                let by_id: HashMap<&str, &StatEvent> =
                    log.iter().map(|r| (r.id.as_str(), r)).collect();
                ids.iter()
                    .filter_map(|id| by_id.get(id.as_str()).copied())
                    .cloned()
                    .collect()
            }
            None => self.base_rows(log).into_iter().cloned().collect(),
        };
        sort_rows(&mut rows, self.sort);
        rows
    }

    /// Pin the current membership so edits that would drop a row keep it visible.
    pub fn freeze(&mut self, log: &[StatEvent]) {
        self.frozen = Some(self.base_rows(log).iter().map(|r| r.id.clone()).collect());
    }

    pub fn unfreeze(&mut self) {
        self.frozen = None;
    }

    pub fn toggle_sort(&mut self, field: Field) {
        self.sort = self.sort.cycle(field);
    }

    pub fn set_filter(&mut self, field: Field, filter: ColumnFilter) {
        if filter.conditions.is_empty() {
            self.filters.remove(&field);
        } else {
            self.filters.insert(field, filter);
        }
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    pub fn toggle_column(&mut self, field: Field) {
        if !self.visible.remove(&field) {
            self.visible.insert(field);
        }
    }

    fn has_visible_data(&self, row: &StatEvent) -> bool {
        self.visible.iter().any(|field| match row.value(*field) {
            FieldValue::Null => false,
            FieldValue::Text(s) => !s.is_empty(),
            _ => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, player: Option<&str>, quality: Option<f64>) -> StatEvent {
        StatEvent {
            id: id.to_string(),
            player: player.map(str::to_string),
            quality,
            ..StatEvent::default()
        }
    }

    #[test]
    fn text_conditions_are_case_insensitive() {
        let f = ColumnFilter::new(vec![Condition::new(Operator::Contains, "AL")]);
        assert!(f.matches(Field::Player, &row("1", Some("alex"), None)));
        assert!(!f.matches(Field::Player, &row("2", Some("sam"), None)));
        assert!(!f.matches(Field::Player, &row("3", None, None)));
    }

    #[test]
    fn numeric_null_only_matches_blank() {
        let cell = row("1", None, None);
        let gt = ColumnFilter::new(vec![Condition::new(Operator::Gt, "1")]);
        let blank = ColumnFilter::new(vec![Condition::new(Operator::Blank, "")]);
        assert!(!gt.matches(Field::Quality, &cell));
        assert!(blank.matches(Field::Quality, &cell));

        let bad = ColumnFilter::new(vec![Condition::new(Operator::Equals, "abc")]);
        assert!(!bad.matches(Field::Quality, &row("2", None, Some(3.0))));
    }

    #[test]
    fn between_is_inclusive_and_open_ended() {
        let r = row("1", None, Some(2.0));
        let closed = ColumnFilter::new(vec![Condition::between("2", "3")]);
        let open = ColumnFilter::new(vec![Condition::between("", "2")]);
        let outside = ColumnFilter::new(vec![Condition::between("2.5", "")]);
        assert!(closed.matches(Field::Quality, &r));
        assert!(open.matches(Field::Quality, &r));
        assert!(!outside.matches(Field::Quality, &r));
    }

    #[test]
    fn inactive_conditions_are_skipped() {
        let f = ColumnFilter::new(vec![
            Condition::new(Operator::Equals, ""),
            Condition::between("", ""),
        ]);
        assert!(!f.is_active());
        assert!(f.matches(Field::Quality, &row("1", None, None)));
    }

    #[test]
    fn sort_cycle_returns_to_log_order() {
        let s = SortConfig::default().cycle(Field::Player);
        assert_eq!(s.direction, SortDirection::Asc);
        let s = s.cycle(Field::Player);
        assert_eq!(s.direction, SortDirection::Desc);
        assert_eq!(s.cycle(Field::Player), SortConfig::default());
    }

    #[test]
    fn frozen_view_keeps_rows_that_no_longer_match() {
        let mut log = vec![row("1", Some("alex"), Some(3.0)), row("2", Some("sam"), Some(1.0))];
        let mut view = ViewState::default();
        view.set_filter(
            Field::Player,
            ColumnFilter::new(vec![Condition::new(Operator::Equals, "alex")]),
        );
        view.freeze(&log);
        log[0].player = Some("jo".to_string());
        let ids: Vec<_> = view.rows(&log).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1".to_string()]);

        view.unfreeze();
        assert!(view.rows(&log).is_empty());
    }

    #[test]
    fn rows_without_visible_data_are_hidden() {
        let mut view = ViewState::default();
        view.visible = [Field::Player].into_iter().collect();
        let log = vec![row("1", None, Some(3.0)), row("2", Some("sam"), None)];
        let ids: Vec<_> = view.rows(&log).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["2".to_string()]);
    }
}
