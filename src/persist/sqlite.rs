//! SQLite-backed contest repository.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{
    model::{Contender, ContenderTick, Contest, Problem, Score, Tick},
    types::{CompClassId, ContenderId, ContestId, OrganizerId, ProblemId},
};

use super::{PersistError, PersistResult, Repository};

/// SQLite implementation of [`crate::persist::Repository`].
///
/// Timestamps are stored as Unix milliseconds.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Opens or creates a repository at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts or updates a contest.
    pub fn save_contest(&self, contest: &Contest) -> PersistResult<()> {
        self.conn.lock().execute(
            "INSERT INTO contests(id, organizer_id, qualifying_problems, finalists, time_begin, time_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                organizer_id = excluded.organizer_id,
                qualifying_problems = excluded.qualifying_problems,
                finalists = excluded.finalists,
                time_begin = excluded.time_begin,
                time_end = excluded.time_end",
            params![
                contest.id.0,
                contest.organizer_id.0,
                contest.qualifying_problems,
                contest.finalists,
                contest.time_begin.map(|t| t.timestamp_millis()),
                contest.time_end.map(|t| t.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    /// Inserts or updates a problem of `contest_id`.
    pub fn save_problem(&self, contest_id: ContestId, problem: &Problem) -> PersistResult<()> {
        self.conn.lock().execute(
            "INSERT INTO problems(id, contest_id, points_top, points_zone, flash_bonus)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                points_top = excluded.points_top,
                points_zone = excluded.points_zone,
                flash_bonus = excluded.flash_bonus",
            params![
                problem.id.0,
                contest_id.0,
                problem.points_top,
                problem.points_zone,
                problem.flash_bonus
            ],
        )?;
        Ok(())
    }

    /// Inserts or updates a contender. Its score is not stored here.
    pub fn save_contender(&self, contest_id: ContestId, contender: &Contender) -> PersistResult<()> {
        self.conn.lock().execute(
            "INSERT INTO contenders(id, contest_id, comp_class_id, disqualified, withdrawn_from_finals)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                comp_class_id = excluded.comp_class_id,
                disqualified = excluded.disqualified,
                withdrawn_from_finals = excluded.withdrawn_from_finals",
            params![
                contender.id.0,
                contest_id.0,
                contender.comp_class_id.0,
                contender.disqualified,
                contender.withdrawn_from_finals
            ],
        )?;
        Ok(())
    }

    /// Deletes a contender and, through the schema, its ticks and score.
    pub fn delete_contender(&self, contender_id: ContenderId) -> PersistResult<()> {
        let count = self
            .conn
            .lock()
            .execute("DELETE FROM contenders WHERE id = ?1", params![contender_id.0])?;

        if count == 0 {
            return Err(PersistError::NotFound);
        }
        Ok(())
    }

    /// Upserts on (contender, problem).
    pub fn save_tick(&self, contest_id: ContestId, tick: &ContenderTick) -> PersistResult<()> {
        self.conn.lock().execute(
            "INSERT INTO ticks(contest_id, contender_id, problem_id, top, attempts_top, zone, attempts_zone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(contender_id, problem_id) DO UPDATE SET
                top = excluded.top,
                attempts_top = excluded.attempts_top,
                zone = excluded.zone,
                attempts_zone = excluded.attempts_zone",
            params![
                contest_id.0,
                tick.contender_id.0,
                tick.tick.problem_id.0,
                tick.tick.top,
                tick.tick.attempts_top,
                tick.tick.zone,
                tick.tick.attempts_zone,
            ],
        )?;
        Ok(())
    }

    /// Reads back a persisted score.
    pub fn get_score(&self, contender_id: ContenderId) -> PersistResult<Score> {
        self.conn
            .lock()
            .query_row(
                "SELECT contender_id, ts_ms, score, placement, rank_order, finalist
                 FROM scores WHERE contender_id = ?1",
                params![contender_id.0],
                score_from_row,
            )
            .optional()?
            .ok_or(PersistError::NotFound)
    }
}

impl Repository for SqliteRepository {
    fn get_contests_running_or_about_to_start(
        &self,
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> PersistResult<Vec<Contest>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, organizer_id, qualifying_problems, finalists, time_begin, time_end
             FROM contests
             WHERE time_begin IS NOT NULL
               AND time_begin <= ?2
               AND COALESCE(time_end, time_begin) >= ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(
            params![earliest.timestamp_millis(), latest.timestamp_millis()],
            contest_from_row,
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn get_contest(&self, contest_id: ContestId) -> PersistResult<Contest> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, organizer_id, qualifying_problems, finalists, time_begin, time_end
                 FROM contests WHERE id = ?1",
                params![contest_id.0],
                contest_from_row,
            )
            .optional()?
            .ok_or(PersistError::NotFound)
    }

    fn get_problems_by_contest(&self, contest_id: ContestId) -> PersistResult<Vec<Problem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, points_top, points_zone, flash_bonus
             FROM problems WHERE contest_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![contest_id.0], |row| {
            Ok(Problem {
                id: ProblemId(row.get(0)?),
                points_top: row.get(1)?,
                points_zone: row.get(2)?,
                flash_bonus: row.get(3)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn get_contenders_by_contest(&self, contest_id: ContestId) -> PersistResult<Vec<Contender>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, comp_class_id, disqualified, withdrawn_from_finals
             FROM contenders WHERE contest_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![contest_id.0], |row| {
            Ok(Contender {
                id: ContenderId(row.get(0)?),
                comp_class_id: CompClassId(row.get(1)?),
                disqualified: row.get(2)?,
                withdrawn_from_finals: row.get(3)?,
                score: 0,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn get_ticks_by_contest(&self, contest_id: ContestId) -> PersistResult<Vec<ContenderTick>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT contender_id, problem_id, top, attempts_top, zone, attempts_zone
             FROM ticks WHERE contest_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![contest_id.0], |row| {
            Ok(ContenderTick {
                contender_id: ContenderId(row.get(0)?),
                tick: Tick {
                    problem_id: ProblemId(row.get(1)?),
                    top: row.get(2)?,
                    attempts_top: row.get(3)?,
                    zone: row.get(4)?,
                    attempts_zone: row.get(5)?,
                    points: 0,
                },
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn store_score(&self, score: &Score) -> PersistResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM contenders WHERE id = ?1",
                params![score.contender_id.0],
                |row| row.get(0),
            )
            .optional()?;

        if exists.is_none() {
            return Err(PersistError::NotFound);
        }

        tx.execute(
            "INSERT INTO scores(contender_id, ts_ms, score, placement, rank_order, finalist)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(contender_id) DO UPDATE SET
                ts_ms = excluded.ts_ms,
                score = excluded.score,
                placement = excluded.placement,
                rank_order = excluded.rank_order,
                finalist = excluded.finalist",
            params![
                score.contender_id.0,
                score.timestamp.timestamp_millis(),
                score.score,
                score.placement,
                score.rank_order,
                score.finalist,
            ],
        )?;
        tx.commit()?;

        Ok(())
    }
}

fn contest_from_row(row: &Row<'_>) -> rusqlite::Result<Contest> {
    let time_begin: Option<i64> = row.get(4)?;
    let time_end: Option<i64> = row.get(5)?;

    Ok(Contest {
        id: ContestId(row.get(0)?),
        organizer_id: OrganizerId(row.get(1)?),
        qualifying_problems: row.get(2)?,
        finalists: row.get(3)?,
        time_begin: time_begin.and_then(DateTime::from_timestamp_millis),
        time_end: time_end.and_then(DateTime::from_timestamp_millis),
    })
}

fn score_from_row(row: &Row<'_>) -> rusqlite::Result<Score> {
    let ts_ms: i64 = row.get(1)?;

    Ok(Score {
        timestamp: DateTime::from_timestamp_millis(ts_ms).unwrap_or_default(),
        contender_id: ContenderId(row.get(0)?),
        score: row.get(2)?,
        placement: row.get(3)?,
        rank_order: row.get(4)?,
        finalist: row.get(5)?,
    })
}
