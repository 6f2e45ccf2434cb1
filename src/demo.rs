use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::local_store::SqliteStore;
use crate::stat_event::{
    Game, POSITION_OPTIONS, PointResult, Roster, RosterEntry, StatEvent,
};
use crate::store::StoreError;

pub const DEMO_TEAM_ID: &str = "practice-team";
const INTRO_SECS: f64 = 45.0;
const SET_BREAK_SECS: f64 = 90.0;
const MAX_RALLIES_PER_SET: u32 = 200;

const SETTER: &str = "Casey";
const NAMES: [&str; 7] = ["Avery", "Blake", "Casey", "Devon", "Emery", "Finley", "Harper"];

/// A synthetic scored game for practice mode and benches.
#[derive(Debug, Clone)]
pub struct DemoGame {
    pub game: Game,
    pub roster: Roster,
    pub events: Vec<StatEvent>,
}

impl DemoGame {
    pub fn game_id(&self) -> &str {
        &self.game.id
    }

    pub fn seed_into(&self, store: &SqliteStore) -> Result<usize, StoreError> {
        store.upsert_game(&self.game)?;
        store.replace_events(&self.game.id, &self.events)
    }
}

pub fn demo_roster() -> Roster {
    Roster::new(
        NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| RosterEntry {
                user_id: format!("u{}", i + 1),
                display_name: (*name).to_string(),
            })
            .collect(),
    )
}

/// Same seed, same game.
pub fn generate(seed: u64, sets: u32) -> DemoGame {
    let mut rng = StdRng::seed_from_u64(seed);
    let roster = demo_roster();
    let game_id = format!("practice-{seed}");
    let mut builder = LogBuilder {
        game_id: game_id.clone(),
        roster: roster.clone(),
        events: Vec::new(),
        t: INTRO_SECS,
    };

    let mut we_serve = rng.gen_bool(0.5);
    for set in 1..=sets.clamp(1, 5) {
        let target = if set == 5 { 15 } else { 25 };
        let (mut ours, mut theirs) = (0u32, 0u32);
        let mut rally = 1u32;
        while !set_over(ours, theirs, target) && rally <= MAX_RALLIES_PER_SET {
            let won = builder.rally(&mut rng, set, rally, we_serve, (ours, theirs));
            if won {
                ours += 1;
            } else {
                theirs += 1;
            }
            we_serve = won;
            rally += 1;
            builder.t += rng.gen_range(10.0..18.0);
        }
        builder.t += SET_BREAK_SECS;
    }

    DemoGame {
        game: Game {
            id: game_id,
            team_id: DEMO_TEAM_ID.to_string(),
            title: format!("Practice scrimmage #{seed}"),
            date: Some(chrono::Utc::now().date_naive().to_string()),
            is_scored: true,
            video_url: None,
        },
        roster,
        events: builder.events,
    }
}

fn set_over(ours: u32, theirs: u32, target: u32) -> bool {
    (ours >= target || theirs >= target) && ours.abs_diff(theirs) >= 2
}

struct LogBuilder {
    game_id: String,
    roster: Roster,
    events: Vec<StatEvent>,
    t: f64,
}

impl LogBuilder {
    /// Log one rally and report whether we won it.
    fn rally(
        &mut self,
        rng: &mut StdRng,
        set: u32,
        rally: u32,
        we_serve: bool,
        score: (u32, u32),
    ) -> bool {
        let first = self.events.len();
        let mut outcome = None;

        if we_serve {
            let server = self.pick_hitter(rng);
            self.touch(rng, set, rally, score, Some(server), "Serve");
            let roll: f64 = rng.r#gen();
            if roll < 0.1 {
                outcome = Some(PointResult::Won);
            } else if roll < 0.2 {
                outcome = Some(PointResult::Lost);
            }
        } else if rng.gen_bool(0.08) {
            // Opponent service error: nothing of ours to log but the point.
            self.touch(rng, set, rally, score, None, "");
            outcome = Some(PointResult::Won);
        }

        let mut exchanges = 0;
        while outcome.is_none() {
            let receive = if exchanges == 0 && !we_serve { "Pass" } else { "Dig" };
            let receiver = self.pick_hitter(rng);
            self.touch(rng, set, rally, score, Some(receiver), receive);
            if rng.gen_bool(0.08) {
                outcome = Some(PointResult::Lost);
                break;
            }

            let hitter = self.pick_hitter(rng);
            let idx = self.touch(rng, set, rally, score, Some(SETTER), "Set");
            let position = POSITION_OPTIONS[rng.gen_range(0..POSITION_OPTIONS.len())];
            self.events[idx].set_to_user_id = self.roster.resolve(hitter, &[]);
            self.events[idx].set_to_player = Some(hitter.to_string());
            self.events[idx].set_to_position = Some(position.to_string());

            let attack = if rng.gen_bool(0.2) { "Tip" } else { "Hit" };
            self.touch(rng, set, rally, score, Some(hitter), attack);
            let roll: f64 = rng.r#gen();
            exchanges += 1;
            if roll < 0.45 {
                outcome = Some(PointResult::Won);
            } else if roll < 0.65 || exchanges >= 3 {
                outcome = Some(PointResult::Lost);
            }
        }

        let result = outcome.unwrap_or(PointResult::Lost);
        let (ours, theirs) = match result {
            PointResult::Won => (score.0 + 1, score.1),
            PointResult::Lost => (score.0, score.1 + 1),
        };
        if self.events.len() > first
            && let Some(last) = self.events.last_mut()
        {
            last.result = Some(result.label().to_string());
            last.our_score = Some(ours);
            last.opp_score = Some(theirs);
        }
        result == PointResult::Won
    }

    fn pick_hitter(&self, rng: &mut StdRng) -> &'static str {
        loop {
            let name = NAMES[rng.gen_range(0..NAMES.len())];
            if name != SETTER {
                return name;
            }
        }
    }

    fn touch(
        &mut self,
        rng: &mut StdRng,
        set: u32,
        rally: u32,
        score: (u32, u32),
        player: Option<&str>,
        action: &str,
    ) -> usize {
        let seq = self.events.len() + 1;
        let has_player = player.is_some();
        self.events.push(StatEvent {
            id: format!("demo-{seq:05}"),
            game_id: self.game_id.clone(),
            team_id: DEMO_TEAM_ID.to_string(),
            set: Some(set),
            rally_id: Some(rally),
            import_seq: seq as f64,
            timestamp: Some((self.t * 100.0).round() / 100.0),
            player: player.map(str::to_string),
            player_user_id: player.and_then(|p| self.roster.resolve(p, &[])),
            action_type: (!action.is_empty()).then(|| action.to_string()),
            quality: has_player.then(|| f64::from(rng.gen_range(0..=3u8))),
            our_score: Some(score.0),
            opp_score: Some(score.1),
            ..StatEvent::default()
        });
        self.t += rng.gen_range(1.2..2.8);
        seq - 1
    }
}
