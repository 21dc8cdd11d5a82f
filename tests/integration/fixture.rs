use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use guild_ladder::core::{CreditAward, CreditSource, MemberProgress, ProgressKey};
use guild_ladder::engine::{
    AwardOutcome, Clock, Dispatch, EngineSettings, ManualClock, ProgressionEngine,
};
use guild_ladder::storage::{Database, ProgressStore};
use tempfile::TempDir;

pub const GUILD: &str = "translators";
pub const SKILL: &str = "french";

pub struct EngineFixture {
    _temp_dir: TempDir,
    pub db_path: PathBuf,
    pub clock: Arc<ManualClock>,
    pub engine: ProgressionEngine<Database>,
}

impl EngineFixture {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let db_path = temp_dir.path().join("ladder.db");
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = ProgressionEngine::new(Database::open(&db_path).expect("open db"), settings)
            .with_clock(clock.clone());
        engine.seed_default_ladder(GUILD, SKILL).expect("seed ladder");
        Self {
            _temp_dir: temp_dir,
            db_path,
            clock,
            engine,
        }
    }

    pub fn award(&self, user: &str, amount: i64) -> AwardOutcome {
        self.engine
            .award_credits(&CreditAward::new(key(user), amount, CreditSource::TaskReview))
            .expect("award")
    }

    /// Put a member directly at `level`.
    pub fn place(&self, user: &str, level: u32) {
        let now = self.clock.now();
        let store = self.engine.store();
        let mut progress = store
            .load_progress(&key(user))
            .expect("load")
            .unwrap_or_else(|| MemberProgress::new(&key(user), now));
        for next in progress.current_level + 1..=level {
            progress.grant_level(next, now).expect("grant");
        }
        store.save_progress(&mut progress).expect("save");
    }

    /// Walk a fresh member to the point where level 2 is requested.
    pub fn open_level_two_request(&self, user: &str) -> String {
        self.award(user, 5);
        self.clock.advance(Duration::days(31));
        match self.award(user, 60).dispatch {
            Some(Dispatch::PendingRequest(request)) => request.id,
            other => panic!("expected a pending request, got {other:?}"),
        }
    }
}

pub fn key(user: &str) -> ProgressKey {
    ProgressKey::new(user, GUILD, SKILL)
}
