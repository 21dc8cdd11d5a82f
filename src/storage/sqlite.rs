//! SQLite database layer

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode as SqliteErrorCode, Row, Transaction, TransactionBehavior};
use tracing::debug;

use crate::core::{
    CreditEntry, LevelDefinition, MemberProgress, ProgressKey, VerificationRequest, VoteRecord,
};
use crate::error::{LadderError, Result};
use crate::storage::{migrations, ProgressStore};

const LEVEL_COLUMNS: &str = "guild, skill, level, name, credits_required, verification_strategy, \
     verifier_minimum_level, quorum_size, tenure_minimum_days, weight";

const PROGRESS_COLUMNS: &str = "user_id, guild, skill, current_level, credits_since_level, \
     level_achieved_at, created_at, pending_verification, version";

const CREDIT_COLUMNS: &str =
    "id, user_id, guild, skill, amount, source_type, source_id, reviewer, notes, created_at";

const VERIFICATION_COLUMNS: &str = "id, user_id, guild, skill, target_level, status, \
     verification_strategy, quorum_size, approve_count, deny_count, defer_count, feedback, \
     created_at, completed_at";

const VOTE_COLUMNS: &str = "id, verification_id, verifier, decision, feedback, created_at";

/// SQLite database wrapper for ladders, progress, ledger and verifications
pub struct Database {
    conn: Connection,
    schema_version: u32,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_secs(5))
    }

    /// Open database with an explicit busy timeout for cross-process writers
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::configure_pragmas(&conn, true)?;
        let schema_version = migrations::run_migrations(&conn)?;
        debug!("Opened database at {:?} (schema v{})", path, schema_version);

        Ok(Self {
            conn,
            schema_version,
        })
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_pragmas(&conn, false)?;
        let schema_version = migrations::run_migrations(&conn)?;
        Ok(Self {
            conn,
            schema_version,
        })
    }

    /// Get a reference to the connection
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Current schema version after migrations.
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check;", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    fn configure_pragmas(conn: &Connection, wal: bool) -> Result<()> {
        if wal {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }
}

impl ProgressStore for Database {
    fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        // IMMEDIATE takes the write lock up front so a read-modify-write never
        // races another process between its read and its write.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    fn get_level(&self, guild: &str, skill: &str, level: u32) -> Result<Option<LevelDefinition>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {LEVEL_COLUMNS} FROM level_definitions WHERE guild = ? AND skill = ? AND level = ?"
        ))?;
        let mut rows = stmt.query(params![guild, skill, level])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(level_from_row(row)?));
        }
        Ok(None)
    }

    fn list_levels(&self, guild: &str, skill: &str) -> Result<Vec<LevelDefinition>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {LEVEL_COLUMNS} FROM level_definitions WHERE guild = ? AND skill = ? ORDER BY level"
        ))?;
        let rows = stmt.query_map(params![guild, skill], level_from_row)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn insert_level(&self, level: &LevelDefinition) -> Result<()> {
        self.conn.execute(
            &format!("INSERT INTO level_definitions ({LEVEL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            level_params(level),
        )?;
        Ok(())
    }

    fn upsert_level(&self, level: &LevelDefinition) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO level_definitions ({LEVEL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(guild, skill, level) DO UPDATE SET
                    name=excluded.name,
                    credits_required=excluded.credits_required,
                    verification_strategy=excluded.verification_strategy,
                    verifier_minimum_level=excluded.verifier_minimum_level,
                    quorum_size=excluded.quorum_size,
                    tenure_minimum_days=excluded.tenure_minimum_days,
                    weight=excluded.weight"
            ),
            level_params(level),
        )?;
        Ok(())
    }

    fn append_credit(&self, entry: &CreditEntry) -> Result<()> {
        self.conn.execute(
            &format!("INSERT INTO credit_ledger ({CREDIT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                entry.id,
                entry.user,
                entry.guild,
                entry.skill,
                entry.amount,
                entry.source_type.as_str(),
                entry.source_id,
                entry.reviewer,
                entry.notes,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    fn credit_history(
        &self,
        user: &str,
        guild: &str,
        skill: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CreditEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut results = Vec::new();

        if let Some(skill) = skill {
            let mut stmt = self.conn.prepare_cached(&format!(
                "SELECT {CREDIT_COLUMNS} FROM credit_ledger
                 WHERE user_id = ? AND guild = ? AND skill = ?
                 ORDER BY created_at DESC, rowid DESC LIMIT ?"
            ))?;
            let rows = stmt.query_map(params![user, guild, skill, limit], credit_from_row)?;
            for row in rows {
                results.push(row?);
            }
        } else {
            let mut stmt = self.conn.prepare_cached(&format!(
                "SELECT {CREDIT_COLUMNS} FROM credit_ledger
                 WHERE user_id = ? AND guild = ?
                 ORDER BY created_at DESC, rowid DESC LIMIT ?"
            ))?;
            let rows = stmt.query_map(params![user, guild, limit], credit_from_row)?;
            for row in rows {
                results.push(row?);
            }
        }

        Ok(results)
    }

    fn credit_total(&self, key: &ProgressKey) -> Result<i64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM credit_ledger
             WHERE user_id = ? AND guild = ? AND skill = ?",
            params![key.user, key.guild, key.skill],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    fn load_progress(&self, key: &ProgressKey) -> Result<Option<MemberProgress>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM member_progress WHERE user_id = ? AND guild = ? AND skill = ?"
        ))?;
        let mut rows = stmt.query(params![key.user, key.guild, key.skill])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(progress_from_row(row)?));
        }
        Ok(None)
    }

    fn list_progress(&self, user: &str, guild: &str) -> Result<Vec<MemberProgress>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM member_progress WHERE user_id = ? AND guild = ? ORDER BY skill"
        ))?;
        let rows = stmt.query_map(params![user, guild], progress_from_row)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn save_progress(&self, progress: &mut MemberProgress) -> Result<()> {
        let key = progress.key();
        if progress.version == 0 {
            let inserted = self.conn.execute(
                &format!(
                    "INSERT INTO member_progress ({PROGRESS_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
                     ON CONFLICT(user_id, guild, skill) DO NOTHING"
                ),
                params![
                    progress.user,
                    progress.guild,
                    progress.skill,
                    progress.current_level,
                    progress.credits_since_level,
                    progress.level_achieved_at,
                    progress.created_at,
                    progress.pending_verification,
                ],
            )?;
            if inserted == 0 {
                return Err(LadderError::ConcurrentModification(key.to_string()));
            }
            progress.version = 1;
            return Ok(());
        }

        let expected = i64::try_from(progress.version).unwrap_or(i64::MAX);
        let updated = self.conn.execute(
            "UPDATE member_progress SET
                current_level = ?,
                credits_since_level = ?,
                level_achieved_at = ?,
                pending_verification = ?,
                version = version + 1
             WHERE user_id = ? AND guild = ? AND skill = ? AND version = ?",
            params![
                progress.current_level,
                progress.credits_since_level,
                progress.level_achieved_at,
                progress.pending_verification,
                progress.user,
                progress.guild,
                progress.skill,
                expected,
            ],
        )?;
        if updated == 0 {
            return Err(LadderError::ConcurrentModification(key.to_string()));
        }
        progress.version += 1;
        Ok(())
    }

    fn insert_verification(&self, request: &VerificationRequest) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO verification_requests ({VERIFICATION_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                request.id,
                request.user,
                request.guild,
                request.skill,
                request.target_level,
                request.status.as_str(),
                request.verification_strategy.as_str(),
                request.quorum_size,
                request.approve_count,
                request.deny_count,
                request.defer_count,
                request.feedback,
                request.created_at,
                request.completed_at,
            ],
        )?;
        Ok(())
    }

    fn get_verification(&self, id: &str) -> Result<Option<VerificationRequest>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {VERIFICATION_COLUMNS} FROM verification_requests WHERE id = ?"
        ))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(verification_from_row(row)?));
        }
        Ok(None)
    }

    fn update_verification(&self, request: &VerificationRequest) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE verification_requests SET
                status = ?,
                approve_count = ?,
                deny_count = ?,
                defer_count = ?,
                feedback = ?,
                completed_at = ?
             WHERE id = ?",
            params![
                request.status.as_str(),
                request.approve_count,
                request.deny_count,
                request.defer_count,
                request.feedback,
                request.completed_at,
                request.id,
            ],
        )?;
        if updated == 0 {
            return Err(LadderError::VerificationNotFound(request.id.clone()));
        }
        Ok(())
    }

    fn list_pending_verifications(&self, guild: Option<&str>) -> Result<Vec<VerificationRequest>> {
        let mut results = Vec::new();
        if let Some(guild) = guild {
            let mut stmt = self.conn.prepare_cached(&format!(
                "SELECT {VERIFICATION_COLUMNS} FROM verification_requests
                 WHERE status = 'pending' AND guild = ?
                 ORDER BY created_at"
            ))?;
            let rows = stmt.query_map([guild], verification_from_row)?;
            for row in rows {
                results.push(row?);
            }
        } else {
            let mut stmt = self.conn.prepare_cached(&format!(
                "SELECT {VERIFICATION_COLUMNS} FROM verification_requests
                 WHERE status = 'pending'
                 ORDER BY created_at"
            ))?;
            let rows = stmt.query_map([], verification_from_row)?;
            for row in rows {
                results.push(row?);
            }
        }
        Ok(results)
    }

    fn has_voted(&self, verification_id: &str, verifier: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM verification_votes WHERE verification_id = ? AND verifier = ?",
            params![verification_id, verifier],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert_vote(&self, vote: &VoteRecord) -> Result<()> {
        let result = self.conn.execute(
            &format!("INSERT INTO verification_votes ({VOTE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)"),
            params![
                vote.id,
                vote.verification_id,
                vote.verifier,
                vote.decision.as_str(),
                vote.feedback,
                vote.created_at,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == SqliteErrorCode::ConstraintViolation =>
            {
                Err(LadderError::DuplicateVote {
                    id: vote.verification_id.clone(),
                    verifier: vote.verifier.clone(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn list_votes(&self, verification_id: &str) -> Result<Vec<VoteRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {VOTE_COLUMNS} FROM verification_votes
             WHERE verification_id = ?
             ORDER BY created_at, rowid"
        ))?;
        let rows = stmt.query_map([verification_id], vote_from_row)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

fn level_params(level: &LevelDefinition) -> impl rusqlite::Params + '_ {
    (
        &level.guild,
        &level.skill,
        level.level,
        &level.name,
        level.credits_required,
        level.verification_strategy.as_str(),
        level.verifier_minimum_level,
        level.quorum_size,
        level.tenure_minimum_days,
        level.weight,
    )
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = LadderError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn level_from_row(row: &Row<'_>) -> rusqlite::Result<LevelDefinition> {
    Ok(LevelDefinition {
        guild: row.get(0)?,
        skill: row.get(1)?,
        level: row.get(2)?,
        name: row.get(3)?,
        credits_required: row.get(4)?,
        verification_strategy: parse_column(row, 5)?,
        verifier_minimum_level: row.get(6)?,
        quorum_size: row.get(7)?,
        tenure_minimum_days: row.get(8)?,
        weight: row.get(9)?,
    })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<MemberProgress> {
    let version: i64 = row.get(8)?;
    Ok(MemberProgress {
        user: row.get(0)?,
        guild: row.get(1)?,
        skill: row.get(2)?,
        current_level: row.get(3)?,
        credits_since_level: row.get(4)?,
        level_achieved_at: row.get(5)?,
        created_at: row.get(6)?,
        pending_verification: row.get(7)?,
        version: u64::try_from(version).unwrap_or(0),
    })
}

fn credit_from_row(row: &Row<'_>) -> rusqlite::Result<CreditEntry> {
    Ok(CreditEntry {
        id: row.get(0)?,
        user: row.get(1)?,
        guild: row.get(2)?,
        skill: row.get(3)?,
        amount: row.get(4)?,
        source_type: parse_column(row, 5)?,
        source_id: row.get(6)?,
        reviewer: row.get(7)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn verification_from_row(row: &Row<'_>) -> rusqlite::Result<VerificationRequest> {
    Ok(VerificationRequest {
        id: row.get(0)?,
        user: row.get(1)?,
        guild: row.get(2)?,
        skill: row.get(3)?,
        target_level: row.get(4)?,
        status: parse_column(row, 5)?,
        verification_strategy: parse_column(row, 6)?,
        quorum_size: row.get(7)?,
        approve_count: row.get(8)?,
        deny_count: row.get(9)?,
        defer_count: row.get(10)?,
        feedback: row.get(11)?,
        created_at: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

fn vote_from_row(row: &Row<'_>) -> rusqlite::Result<VoteRecord> {
    Ok(VoteRecord {
        id: row.get(0)?,
        verification_id: row.get(1)?,
        verifier: row.get(2)?,
        decision: parse_column(row, 3)?,
        feedback: row.get(4)?,
        created_at: row.get(5)?,
    })
}
