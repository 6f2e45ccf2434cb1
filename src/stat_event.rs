use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RESULT_OPTIONS: [&str; 2] = ["Won Point", "Lost Point"];
pub const ACTION_TYPE_OPTIONS: [&str; 8] = [
    "Serve", "Pass", "Set", "Tip", "Hit", "Block", "Dig", "Free",
];
pub const POSITION_OPTIONS: [&str; 4] = ["Power", "Middle", "Opposite", "Backrow"];

/// One logged touch. Field names match the `stats` resource columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatEvent {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_id_or_empty")]
    pub game_id: String,
    #[serde(default, deserialize_with = "de_id_or_empty")]
    pub team_id: String,
    #[serde(default)]
    pub set: Option<u32>,
    #[serde(default)]
    pub rally_id: Option<u32>,
    #[serde(default)]
    pub import_seq: f64,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub player: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub player_user_id: Option<String>,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub quality: Option<f64>,
    #[serde(default)]
    pub set_to_player: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub set_to_user_id: Option<String>,
    #[serde(default)]
    pub set_to_position: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub our_score: Option<u32>,
    #[serde(default)]
    pub opp_score: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Row shape for inserts; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NewStatEvent {
    pub game_id: String,
    pub team_id: String,
    pub set: Option<u32>,
    pub rally_id: Option<u32>,
    pub import_seq: f64,
    pub our_score: Option<u32>,
    pub opp_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl NewStatEvent {
    pub fn into_event(self, id: String) -> StatEvent {
        StatEvent {
            id,
            game_id: self.game_id,
            team_id: self.team_id,
            set: self.set,
            rally_id: self.rally_id,
            import_seq: self.import_seq,
            timestamp: self.timestamp,
            player: self.player,
            action_type: self.action_type,
            result: self.result,
            our_score: self.our_score,
            opp_score: self.opp_score,
            ..StatEvent::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Game {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_id_or_empty")]
    pub team_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, rename = "isscored")]
    pub is_scored: bool,
    #[serde(default)]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointResult {
    Won,
    Lost,
}

impl PointResult {
    pub fn label(self) -> &'static str {
        match self {
            PointResult::Won => RESULT_OPTIONS[0],
            PointResult::Lost => RESULT_OPTIONS[1],
        }
    }

    /// Free-text result entry. Anything unrecognised means "no result".
    pub fn normalize(raw: &str) -> Option<Self> {
        let s = raw.trim().to_lowercase();
        if s.is_empty() {
            return None;
        }
        if s == "w" || s == "win" || s.starts_with("won") {
            return Some(PointResult::Won);
        }
        if s == "l" || s == "loss" || s.starts_with("lost") {
            return Some(PointResult::Lost);
        }
        None
    }
}

impl fmt::Display for PointResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn normalize_result(raw: Option<&str>) -> Option<PointResult> {
    raw.and_then(PointResult::normalize)
}

impl StatEvent {
    pub fn point_result(&self) -> Option<PointResult> {
        normalize_result(self.result.as_deref())
    }

    pub fn ends_rally(&self) -> bool {
        self.point_result().is_some()
    }

    pub fn has_player(&self) -> bool {
        non_blank(self.player.as_deref())
    }

    pub fn is_set_action(&self) -> bool {
        self.action_type
            .as_deref()
            .is_some_and(|a| a.trim().eq_ignore_ascii_case("set"))
    }

    pub fn score(&self) -> Option<(u32, u32)> {
        Some((self.our_score?, self.opp_score?))
    }

    pub fn value(&self, field: Field) -> FieldValue {
        match field {
            Field::ImportSeq => FieldValue::Float(self.import_seq),
            Field::Timestamp => FieldValue::from_f64(self.timestamp),
            Field::Set => FieldValue::from_u32(self.set),
            Field::RallyId => FieldValue::from_u32(self.rally_id),
            Field::Player => FieldValue::from_text(&self.player),
            Field::PlayerUserId => FieldValue::from_text(&self.player_user_id),
            Field::ActionType => FieldValue::from_text(&self.action_type),
            Field::Quality => FieldValue::from_f64(self.quality),
            Field::SetToPlayer => FieldValue::from_text(&self.set_to_player),
            Field::SetToUserId => FieldValue::from_text(&self.set_to_user_id),
            Field::SetToPosition => FieldValue::from_text(&self.set_to_position),
            Field::Result => FieldValue::from_text(&self.result),
            Field::OurScore => FieldValue::from_u32(self.our_score),
            Field::OppScore => FieldValue::from_u32(self.opp_score),
            Field::Notes => FieldValue::from_text(&self.notes),
        }
    }

    pub fn set_value(&mut self, field: Field, value: FieldValue) {
        match field {
            Field::ImportSeq => self.import_seq = value.as_f64().unwrap_or(self.import_seq),
            Field::Timestamp => self.timestamp = value.as_f64(),
            Field::Set => self.set = value.as_u32(),
            Field::RallyId => self.rally_id = value.as_u32(),
            Field::Player => self.player = value.into_text(),
            Field::PlayerUserId => self.player_user_id = value.into_text(),
            Field::ActionType => self.action_type = value.into_text(),
            Field::Quality => self.quality = value.as_f64(),
            Field::SetToPlayer => self.set_to_player = value.into_text(),
            Field::SetToUserId => self.set_to_user_id = value.into_text(),
            Field::SetToPosition => self.set_to_position = value.into_text(),
            Field::Result => self.result = value.into_text(),
            Field::OurScore => self.our_score = value.as_u32(),
            Field::OppScore => self.opp_score = value.as_u32(),
            Field::Notes => self.notes = value.into_text(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ImportSeq,
    Timestamp,
    Set,
    RallyId,
    Player,
    PlayerUserId,
    ActionType,
    Quality,
    SetToPlayer,
    SetToUserId,
    SetToPosition,
    Result,
    OurScore,
    OppScore,
    Notes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
}

impl FieldKind {
    pub fn is_numeric(self) -> bool {
        !matches!(self, FieldKind::Text)
    }
}

impl Field {
    /// Columns the review grid knows about, in display order.
    pub const GRID: [Field; 12] = [
        Field::Timestamp,
        Field::Set,
        Field::RallyId,
        Field::Player,
        Field::ActionType,
        Field::Quality,
        Field::SetToPlayer,
        Field::SetToPosition,
        Field::Result,
        Field::OurScore,
        Field::OppScore,
        Field::Notes,
    ];

    pub const ALL: [Field; 15] = [
        Field::ImportSeq,
        Field::Timestamp,
        Field::Set,
        Field::RallyId,
        Field::Player,
        Field::PlayerUserId,
        Field::ActionType,
        Field::Quality,
        Field::SetToPlayer,
        Field::SetToUserId,
        Field::SetToPosition,
        Field::Result,
        Field::OurScore,
        Field::OppScore,
        Field::Notes,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::ImportSeq => "import_seq",
            Field::Timestamp => "timestamp",
            Field::Set => "set",
            Field::RallyId => "rally_id",
            Field::Player => "player",
            Field::PlayerUserId => "player_user_id",
            Field::ActionType => "action_type",
            Field::Quality => "quality",
            Field::SetToPlayer => "set_to_player",
            Field::SetToUserId => "set_to_user_id",
            Field::SetToPosition => "set_to_position",
            Field::Result => "result",
            Field::OurScore => "our_score",
            Field::OppScore => "opp_score",
            Field::Notes => "notes",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Field::ALL.into_iter().find(|f| f.key() == key)
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::ImportSeq => "Seq",
            Field::Timestamp => "Time",
            Field::Set => "Set",
            Field::RallyId => "Rally",
            Field::Player => "Player",
            Field::PlayerUserId => "Player Id",
            Field::ActionType => "Action",
            Field::Quality => "Quality",
            Field::SetToPlayer => "Set To",
            Field::SetToUserId => "Set To Id",
            Field::SetToPosition => "Set Pos",
            Field::Result => "Result",
            Field::OurScore => "Us",
            Field::OppScore => "Them",
            Field::Notes => "Notes",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Set | Field::RallyId | Field::OurScore | Field::OppScore => FieldKind::Integer,
            Field::ImportSeq | Field::Timestamp | Field::Quality => FieldKind::Float,
            _ => FieldKind::Text,
        }
    }

    /// Ordering keys and identity companions are maintained by the engine, not typed in.
    pub fn is_editable(self) -> bool {
        !matches!(
            self,
            Field::ImportSeq | Field::PlayerUserId | Field::SetToUserId
        )
    }

    pub fn identity_companion(self) -> Option<Field> {
        match self {
            Field::Player => Some(Field::PlayerUserId),
            Field::SetToPlayer => Some(Field::SetToUserId),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single cell value, typed loosely the way the REST layer sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    fn from_u32(v: Option<u32>) -> Self {
        v.map_or(FieldValue::Null, |v| FieldValue::Int(i64::from(v)))
    }

    fn from_f64(v: Option<f64>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::Float)
    }

    fn from_text(v: &Option<String>) -> Self {
        v.as_ref()
            .map_or(FieldValue::Null, |s| FieldValue::Text(s.clone()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Null, or text that is only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Null => None,
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            FieldValue::Null => None,
            FieldValue::Int(v) => u32::try_from(*v).ok(),
            FieldValue::Float(v) if *v >= 0.0 && v.is_finite() => Some(v.trunc() as u32),
            FieldValue::Float(_) => None,
            FieldValue::Text(s) => s.trim().parse::<u32>().ok(),
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Int(v) => Some(v.to_string()),
            FieldValue::Float(v) => Some(v.to_string()),
            FieldValue::Text(s) => Some(s),
        }
    }

    /// Lowercased text form used by the text filter operators.
    pub fn filter_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Text(s) => s.to_lowercase(),
        }
    }

    pub fn display(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Float(v) => {
                if v.fract() == 0.0 {
                    format!("{v:.0}")
                } else {
                    format!("{v}")
                }
            }
            FieldValue::Text(s) => s.clone(),
        }
    }
}

/// A registered team member a typed name can resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    /// Roster match first, then names the log already links to an identity.
    pub fn resolve(&self, name: &str, log: &[StatEvent]) -> Option<String> {
        let needle = name.trim();
        if needle.is_empty() {
            return None;
        }
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| equals_ci(&e.display_name, needle))
        {
            return Some(entry.user_id.clone());
        }
        alias_ids(log).remove(&needle.to_lowercase())
    }

    pub fn display_names(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|e| (e.user_id.clone(), e.display_name.clone()))
            .collect()
    }
}

fn alias_ids(log: &[StatEvent]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for row in log {
        if let (Some(name), Some(id)) = (row.player.as_deref(), row.player_user_id.as_deref()) {
            map.insert(name.trim().to_lowercase(), id.to_string());
        }
        if let (Some(name), Some(id)) = (row.set_to_player.as_deref(), row.set_to_user_id.as_deref())
        {
            map.insert(name.trim().to_lowercase(), id.to_string());
        }
    }
    map
}

/// Names offered for player cells: roster first, then any free-text name in the log.
pub fn known_names(roster: &Roster, log: &[StatEvent]) -> Vec<String> {
    let mut seen = HashMap::new();
    let mut out = Vec::new();
    let mut add = |label: &str| {
        let key = label.trim().to_lowercase();
        if key.is_empty() || seen.contains_key(&key) {
            return;
        }
        seen.insert(key, ());
        out.push(label.to_string());
    };
    for entry in &roster.entries {
        add(&entry.display_name);
    }
    for row in log {
        if let Some(p) = row.player.as_deref() {
            add(p);
        }
        if let Some(p) = row.set_to_player.as_deref() {
            add(p);
        }
    }
    out
}

/// Prefix suggestions for cells that have a closed or known option list.
pub fn suggestions(field: Field, input: &str, names: &[String]) -> Vec<String> {
    let typed = input.trim().to_lowercase();
    if typed.is_empty() {
        return Vec::new();
    }
    let options: Vec<&str> = match field {
        Field::Player | Field::SetToPlayer => names.iter().map(String::as_str).collect(),
        Field::Result => RESULT_OPTIONS.to_vec(),
        Field::ActionType => ACTION_TYPE_OPTIONS.to_vec(),
        Field::SetToPosition => POSITION_OPTIONS.to_vec(),
        _ => Vec::new(),
    };
    let mut out: Vec<String> = options
        .into_iter()
        .filter(|opt| opt.to_lowercase().starts_with(&typed))
        .map(str::to_string)
        .collect();
    out.sort();
    out
}

/// Advisory validity used for highlighting suspicious cells.
pub fn is_valid_cell(row: &StatEvent, field: Field, names: &[String]) -> bool {
    let value = row.value(field);
    match field {
        Field::SetToPlayer => {
            if value.is_blank() {
                return !row.is_set_action();
            }
            names.iter().any(|n| equals_ci(n, &value.display()))
        }
        Field::SetToPosition => {
            if value.is_blank() {
                return !row.is_set_action();
            }
            let typed = value.display().trim().to_lowercase();
            POSITION_OPTIONS.iter().any(|p| p.to_lowercase() == typed)
        }
        _ if value.is_blank() => true,
        Field::Player => names.iter().any(|n| equals_ci(n, &value.display())),
        Field::ActionType => ACTION_TYPE_OPTIONS.contains(&value.display().as_str()),
        _ => true,
    }
}

pub fn equals_ci(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

pub fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

/// `m:ss.cc` above a minute, `s.cc` below, centiseconds omitted when zero.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let mins = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    let cs = ((seconds % 1.0) * 100.0).floor() as u64;
    if mins == 0 {
        if cs > 0 {
            format!("{secs}.{cs:02}")
        } else {
            format!("{secs}")
        }
    } else if cs > 0 {
        format!("{mins}:{secs:02}.{cs:02}")
    } else {
        format!("{mins}:{secs:02}")
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("unexpected id value: {other}"))),
    }
}

fn de_id_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_id(deserializer)?.unwrap_or_default())
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(de::Error::custom(format!("unexpected id value: {other}"))),
    }
}
