//! Progression events and the collaborator ports that receive them.
//!
//! Every engine operation returns the events it produced. The same events
//! are handed to the injected ports after the state change has committed;
//! a failing port is logged and otherwise ignored.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{ProgressKey, VerificationRequest, VerificationStrategy};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressionEvent {
    /// A request is open and eligible verifiers should be told.
    VerificationInitiated {
        verification_id: String,
        user: String,
        guild: String,
        skill: String,
        target_level: u32,
        strategy: VerificationStrategy,
        quorum_size: u32,
        at: DateTime<Utc>,
    },
    VerificationApproved {
        verification_id: String,
        user: String,
        guild: String,
        skill: String,
        target_level: u32,
        at: DateTime<Utc>,
    },
    VerificationDenied {
        verification_id: String,
        user: String,
        guild: String,
        skill: String,
        target_level: u32,
        at: DateTime<Utc>,
    },
    /// Defer votes reached the escalation threshold; the request stays open.
    VerificationStalled {
        verification_id: String,
        user: String,
        guild: String,
        skill: String,
        defer_count: u32,
        at: DateTime<Utc>,
    },
    VerificationExpired {
        verification_id: String,
        user: String,
        guild: String,
        skill: String,
        target_level: u32,
        at: DateTime<Utc>,
    },
    LevelGranted {
        user: String,
        guild: String,
        skill: String,
        level: u32,
        level_name: String,
        weight: i32,
        at: DateTime<Utc>,
    },
}

impl ProgressionEvent {
    pub(crate) fn initiated(request: &VerificationRequest) -> Self {
        Self::VerificationInitiated {
            verification_id: request.id.clone(),
            user: request.user.clone(),
            guild: request.guild.clone(),
            skill: request.skill.clone(),
            target_level: request.target_level,
            strategy: request.verification_strategy,
            quorum_size: request.quorum_size,
            at: request.created_at,
        }
    }

    pub(crate) fn approved(request: &VerificationRequest, at: DateTime<Utc>) -> Self {
        Self::VerificationApproved {
            verification_id: request.id.clone(),
            user: request.user.clone(),
            guild: request.guild.clone(),
            skill: request.skill.clone(),
            target_level: request.target_level,
            at,
        }
    }

    pub(crate) fn denied(request: &VerificationRequest, at: DateTime<Utc>) -> Self {
        Self::VerificationDenied {
            verification_id: request.id.clone(),
            user: request.user.clone(),
            guild: request.guild.clone(),
            skill: request.skill.clone(),
            target_level: request.target_level,
            at,
        }
    }

    pub(crate) fn stalled(request: &VerificationRequest, at: DateTime<Utc>) -> Self {
        Self::VerificationStalled {
            verification_id: request.id.clone(),
            user: request.user.clone(),
            guild: request.guild.clone(),
            skill: request.skill.clone(),
            defer_count: request.defer_count,
            at,
        }
    }

    pub(crate) fn expired(request: &VerificationRequest, at: DateTime<Utc>) -> Self {
        Self::VerificationExpired {
            verification_id: request.id.clone(),
            user: request.user.clone(),
            guild: request.guild.clone(),
            skill: request.skill.clone(),
            target_level: request.target_level,
            at,
        }
    }

    /// Snake-case event name, same as the serialized tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::VerificationInitiated { .. } => "verification_initiated",
            Self::VerificationApproved { .. } => "verification_approved",
            Self::VerificationDenied { .. } => "verification_denied",
            Self::VerificationStalled { .. } => "verification_stalled",
            Self::VerificationExpired { .. } => "verification_expired",
            Self::LevelGranted { .. } => "level_granted",
        }
    }

    /// Progress key the event concerns.
    #[must_use]
    pub fn key(&self) -> ProgressKey {
        let (user, guild, skill) = match self {
            Self::VerificationInitiated {
                user, guild, skill, ..
            }
            | Self::VerificationApproved {
                user, guild, skill, ..
            }
            | Self::VerificationDenied {
                user, guild, skill, ..
            }
            | Self::VerificationStalled {
                user, guild, skill, ..
            }
            | Self::VerificationExpired {
                user, guild, skill, ..
            }
            | Self::LevelGranted {
                user, guild, skill, ..
            } => (user, guild, skill),
        };
        ProgressKey::new(user, guild, skill)
    }
}

/// Receives every event, e.g. for notification delivery.
pub trait NotificationPort: Send + Sync {
    fn notify(&self, event: &ProgressionEvent) -> Result<()>;
}

/// Receives level grants, e.g. to award reputation points.
pub trait ScoringPort: Send + Sync {
    fn level_granted(&self, key: &ProgressKey, level: u32, weight: i32) -> Result<()>;
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationPort for TracingNotifier {
    fn notify(&self, event: &ProgressionEvent) -> Result<()> {
        info!(event = event.name(), key = %event.key(), "progression event");
        Ok(())
    }
}

/// Appends events to a file, one JSON object per line.
#[derive(Debug)]
pub struct JsonlEventLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back all logged events.
    pub fn read_all(&self) -> Result<Vec<ProgressionEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<ProgressionEvent>(line).map_err(Into::into))
            .collect()
    }
}

impl NotificationPort for JsonlEventLog {
    fn notify(&self, event: &ProgressionEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Fan-out to the configured ports.
#[derive(Clone, Default)]
pub struct EventBus {
    notifiers: Vec<Arc<dyn NotificationPort>>,
    scoring: Option<Arc<dyn ScoringPort>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("notifiers", &self.notifiers.len())
            .field("scoring", &self.scoring.is_some())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_notifier(&mut self, notifier: Arc<dyn NotificationPort>) {
        self.notifiers.push(notifier);
    }

    pub fn set_scoring(&mut self, scoring: Arc<dyn ScoringPort>) {
        self.scoring = Some(scoring);
    }

    /// Fire-and-forget delivery.
    pub fn deliver(&self, events: &[ProgressionEvent]) {
        for event in events {
            for notifier in &self.notifiers {
                if let Err(err) = notifier.notify(event) {
                    warn!(event = event.name(), error = %err, "notification port failed");
                }
            }

            if let (
                Some(scoring),
                ProgressionEvent::LevelGranted {
                    level, weight, ..
                },
            ) = (&self.scoring, event)
            {
                if let Err(err) = scoring.level_granted(&event.key(), *level, *weight) {
                    warn!(level = *level, key = %event.key(), error = %err, "scoring port failed");
                }
            }
        }
    }
}
