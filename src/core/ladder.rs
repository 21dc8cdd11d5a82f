//! Level ladders: per (guild, skill) ordered level definitions.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LadderError, Result};
use crate::storage::ProgressStore;

use super::validate_identifier;

/// How an advancement to a level is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStrategy {
    /// Granted as soon as the member is eligible
    Auto,
    Mentor,
    Peer,
    Committee,
    Assessment,
}

impl VerificationStrategy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Mentor => "mentor",
            Self::Peer => "peer",
            Self::Committee => "committee",
            Self::Assessment => "assessment",
        }
    }

    /// Whether advancement needs a verification vote.
    #[must_use]
    pub const fn requires_vote(&self) -> bool {
        !matches!(self, Self::Auto)
    }
}

impl fmt::Display for VerificationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStrategy {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "mentor" => Ok(Self::Mentor),
            "peer" => Ok(Self::Peer),
            "committee" => Ok(Self::Committee),
            "assessment" => Ok(Self::Assessment),
            other => Err(LadderError::Validation(format!(
                "unknown verification strategy '{other}' (expected auto|mentor|peer|committee|assessment)"
            ))),
        }
    }
}

/// One rung of a ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDefinition {
    pub guild: String,
    pub skill: String,
    /// 1-based level number
    pub level: u32,
    pub name: String,
    /// Credits needed since the previous level
    pub credits_required: i64,
    pub verification_strategy: VerificationStrategy,
    /// Minimum level a verifier must hold in the same skill
    pub verifier_minimum_level: u32,
    /// Same-decision votes needed to resolve a verification
    pub quorum_size: u32,
    /// Whole days the member must have held the previous level
    pub tenure_minimum_days: u32,
    /// Display ordering weight
    pub weight: i32,
}

impl LevelDefinition {
    pub fn validate(&self) -> Result<()> {
        validate_identifier("guild", &self.guild)?;
        validate_identifier("skill", &self.skill)?;
        if self.level == 0 {
            return Err(LadderError::InvalidLadder(
                "level numbers start at 1".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(LadderError::InvalidLadder(format!(
                "level {} has an empty name",
                self.level
            )));
        }
        if self.credits_required < 0 {
            return Err(LadderError::InvalidLadder(format!(
                "level {} requires negative credits",
                self.level
            )));
        }
        if self.verification_strategy.requires_vote() && self.quorum_size == 0 {
            return Err(LadderError::InvalidLadder(format!(
                "level {} uses {} verification but has quorum 0",
                self.level, self.verification_strategy
            )));
        }
        Ok(())
    }
}

/// Canonical four-rung ladder.
#[must_use]
pub fn default_ladder(guild: &str, skill: &str) -> Vec<LevelDefinition> {
    let rung = |level, name: &str, credits, strategy, verifier_min, quorum, tenure| {
        LevelDefinition {
            guild: guild.to_string(),
            skill: skill.to_string(),
            level,
            name: name.to_string(),
            credits_required: credits,
            verification_strategy: strategy,
            verifier_minimum_level: verifier_min,
            quorum_size: quorum,
            tenure_minimum_days: tenure,
            weight: i32::try_from(level).unwrap_or(i32::MAX) * 10,
        }
    };

    vec![
        rung(1, "Apprentice", 0, VerificationStrategy::Auto, 0, 0, 0),
        rung(2, "Contributor", 50, VerificationStrategy::Mentor, 3, 1, 30),
        rung(3, "Mentor", 150, VerificationStrategy::Peer, 3, 2, 90),
        rung(4, "Master", 400, VerificationStrategy::Committee, 4, 3, 180),
    ]
}

/// TOML ladder document.
///
/// ```toml
/// [[level]]
/// level = 1
/// name = "Apprentice"
/// strategy = "auto"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LadderFile {
    #[serde(default, rename = "level")]
    pub levels: Vec<LevelSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSpec {
    pub level: u32,
    pub name: String,
    #[serde(default)]
    pub credits_required: i64,
    #[serde(default = "default_strategy")]
    pub strategy: VerificationStrategy,
    #[serde(default)]
    pub verifier_minimum_level: u32,
    #[serde(default)]
    pub quorum_size: u32,
    #[serde(default)]
    pub tenure_minimum_days: u32,
    #[serde(default)]
    pub weight: Option<i32>,
}

const fn default_strategy() -> VerificationStrategy {
    VerificationStrategy::Auto
}

impl LadderFile {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| LadderError::InvalidLadder(format!("parse ladder: {err}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Expand into validated definitions for one (guild, skill).
    ///
    /// Levels must be contiguous from 1 so the engine never has a gap to skip.
    pub fn into_definitions(self, guild: &str, skill: &str) -> Result<Vec<LevelDefinition>> {
        let mut defs: Vec<LevelDefinition> = self
            .levels
            .into_iter()
            .map(|spec| LevelDefinition {
                guild: guild.to_string(),
                skill: skill.to_string(),
                level: spec.level,
                name: spec.name,
                credits_required: spec.credits_required,
                verification_strategy: spec.strategy,
                verifier_minimum_level: spec.verifier_minimum_level,
                quorum_size: spec.quorum_size,
                tenure_minimum_days: spec.tenure_minimum_days,
                weight: spec
                    .weight
                    .unwrap_or_else(|| i32::try_from(spec.level).unwrap_or(i32::MAX) * 10),
            })
            .collect();
        defs.sort_by_key(|def| def.level);

        if defs.is_empty() {
            return Err(LadderError::InvalidLadder("ladder has no levels".to_string()));
        }
        for (idx, def) in defs.iter().enumerate() {
            def.validate()?;
            let expected = u32::try_from(idx + 1).unwrap_or(u32::MAX);
            if def.level != expected {
                return Err(LadderError::InvalidLadder(format!(
                    "expected level {expected}, found level {}",
                    def.level
                )));
            }
        }
        Ok(defs)
    }
}

/// Read and administer ladders through a store.
pub struct LevelLadder<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: ProgressStore + ?Sized> LevelLadder<'a, S> {
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn get_level(&self, guild: &str, skill: &str, level: u32) -> Result<Option<LevelDefinition>> {
        self.store.get_level(guild, skill, level)
    }

    /// Highest defined level, 0 when the ladder is empty.
    pub fn max_level(&self, guild: &str, skill: &str) -> Result<u32> {
        Ok(self
            .store
            .list_levels(guild, skill)?
            .iter()
            .map(|def| def.level)
            .max()
            .unwrap_or(0))
    }

    pub fn levels(&self, guild: &str, skill: &str) -> Result<Vec<LevelDefinition>> {
        self.store.list_levels(guild, skill)
    }

    /// Insert the canonical ladder. Seeding an already-seeded ladder fails on
    /// the storage unique key.
    pub fn seed_default(&self, guild: &str, skill: &str) -> Result<Vec<LevelDefinition>> {
        validate_identifier("guild", guild)?;
        validate_identifier("skill", skill)?;
        let defs = default_ladder(guild, skill);
        for def in &defs {
            self.store.insert_level(def)?;
        }
        info!("Seeded default ladder for {}/{}", guild, skill);
        Ok(defs)
    }

    pub fn upsert(&self, def: &LevelDefinition) -> Result<()> {
        def.validate()?;
        self.store.upsert_level(def)?;
        debug!(
            "Upserted level {} ({}) for {}/{}",
            def.level, def.name, def.guild, def.skill
        );
        Ok(())
    }

    pub fn import(&self, guild: &str, skill: &str, file: LadderFile) -> Result<Vec<LevelDefinition>> {
        let defs = file.into_definitions(guild, skill)?;
        for def in &defs {
            self.store.upsert_level(def)?;
        }
        info!("Imported {} levels for {}/{}", defs.len(), guild, skill);
        Ok(defs)
    }
}
