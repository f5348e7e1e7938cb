pub mod models;
pub mod schema;

use chrono::{NaiveDate, NaiveTime, Timelike, Weekday};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::Sqlite;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{
    Attendance, ClassSession, NewAttendance, NewClassSession, NewStudent, NewTeacher, Student,
    Teacher,
};
use rollcall_shared::{SessionEntry, domain};
use tracing::{debug, trace};

use crate::roll::{Roll, take_roll};
use crate::roster::Roster;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A new session intersects an existing one on the same day.
    #[error("schedule conflict: {0}")]
    Conflict(String),

    /// A referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result of a check-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    AlreadyRecorded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub teachers: usize,
    pub students: usize,
    pub sessions_added: usize,
    pub sessions_unchanged: usize,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(4).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    /// Upserts teachers and students and adds any sessions not yet present.
    /// Re-running with the same roster changes nothing.
    pub async fn seed_roster(&self, roster: &Roster) -> Result<SeedSummary, StorageError> {
        use schema::{students, teachers};

        roster
            .validate()
            .map_err(|e| StorageError::InvalidInput(e.to_string()))?;
        let pool = self.pool.clone();
        let roster = roster.clone();
        tokio::task::spawn_blocking(move || -> Result<SeedSummary, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<SeedSummary, StorageError> {
                let mut summary = SeedSummary::default();

                for t in &roster.teachers {
                    let row = NewTeacher {
                        handle: t.handle.as_str(),
                        first_name: &t.first_name,
                        last_name: &t.last_name,
                        phone_number: t.phone.as_str(),
                    };
                    diesel::insert_into(teachers::table)
                        .values(&row)
                        .on_conflict(teachers::handle)
                        .do_update()
                        .set((
                            teachers::first_name.eq(row.first_name),
                            teachers::last_name.eq(row.last_name),
                            teachers::phone_number.eq(row.phone_number),
                        ))
                        .execute(conn)?;
                    summary.teachers += 1;
                }

                for s in &roster.students {
                    let row = NewStudent {
                        lrn: s.lrn.as_str(),
                        first_name: &s.first_name,
                        last_name: &s.last_name,
                        guardian_phone_number: s.guardian_phone.as_str(),
                    };
                    diesel::insert_into(students::table)
                        .values(&row)
                        .on_conflict(students::lrn)
                        .do_update()
                        .set((
                            students::first_name.eq(row.first_name),
                            students::last_name.eq(row.last_name),
                            students::guardian_phone_number.eq(row.guardian_phone_number),
                        ))
                        .execute(conn)?;
                    summary.students += 1;
                }

                for entry in &roster.sessions {
                    if find_identical_session(conn, entry)?.is_some() {
                        summary.sessions_unchanged += 1;
                    } else {
                        let created = insert_session(conn, entry)?;
                        debug!(id = created.id, session = %created.label(), "seeded session");
                        summary.sessions_added += 1;
                    }
                }
                Ok(summary)
            })
        })
        .await?
    }

    /// Adds one weekly session, rejecting it when it intersects another
    /// session on the same day.
    pub async fn add_session(&self, entry: &SessionEntry) -> Result<ClassSession, StorageError> {
        let pool = self.pool.clone();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || -> Result<ClassSession, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| insert_session(conn, &entry))
        })
        .await?
    }

    pub async fn list_sessions(
        &self,
        day_filter: Option<Weekday>,
    ) -> Result<Vec<ClassSession>, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<ClassSession>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut query = sessions.select(ClassSession::as_select()).into_boxed::<Sqlite>();
            if let Some(d) = day_filter {
                query = query.filter(day.eq(domain::day_number(d)));
            }
            Ok(query
                .order((day.asc(), start_time.asc()))
                .load::<ClassSession>(&mut conn)?)
        })
        .await?
    }

    pub async fn get_session(&self, session_id: i32) -> Result<Option<ClassSession>, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<ClassSession>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(sessions
                .filter(id.eq(session_id))
                .select(ClassSession::as_select())
                .first::<ClassSession>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// The session whose `[start, end)` window contains `time` on `weekday`.
    /// Should the schedule ever hold overlapping rows, the earliest start wins.
    pub async fn session_active_at(
        &self,
        weekday: Weekday,
        time: NaiveTime,
    ) -> Result<Option<ClassSession>, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let at = whole_seconds(time);
        tokio::task::spawn_blocking(move || -> Result<Option<ClassSession>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(sessions
                .filter(day.eq(domain::day_number(weekday)))
                .filter(start_time.le(at))
                .filter(end_time.gt(at))
                .order((start_time.asc(), id.asc()))
                .select(ClassSession::as_select())
                .first::<ClassSession>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// The latest session on `weekday` that ended before `time`.
    pub async fn session_before(
        &self,
        weekday: Weekday,
        time: NaiveTime,
    ) -> Result<Option<ClassSession>, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let at = whole_seconds(time);
        tokio::task::spawn_blocking(move || -> Result<Option<ClassSession>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(sessions
                .filter(day.eq(domain::day_number(weekday)))
                .filter(end_time.lt(at))
                .order(end_time.desc())
                .select(ClassSession::as_select())
                .first::<ClassSession>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn find_student(&self, student_lrn: &str) -> Result<Option<Student>, StorageError> {
        use schema::students::dsl::*;
        let pool = self.pool.clone();
        let wanted = student_lrn.trim().to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Student>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(students
                .filter(lrn.eq(&wanted))
                .select(Student::as_select())
                .first::<Student>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn list_students(&self) -> Result<Vec<Student>, StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Student>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(load_students(&mut conn)?)
        })
        .await?
    }

    pub async fn get_teacher(&self, teacher: &str) -> Result<Option<Teacher>, StorageError> {
        use schema::teachers::dsl::*;
        let pool = self.pool.clone();
        let wanted = teacher.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Teacher>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(teachers
                .filter(handle.eq(&wanted))
                .select(Teacher::as_select())
                .first::<Teacher>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn attendance_exists(
        &self,
        student: &str,
        session: i32,
        on: NaiveDate,
    ) -> Result<bool, StorageError> {
        use schema::attendance::dsl::*;
        let pool = self.pool.clone();
        let student_owned = student.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let count: i64 = attendance
                .filter(student_lrn.eq(&student_owned))
                .filter(session_id.eq(session))
                .filter(date.eq(on))
                .count()
                .get_result(&mut conn)?;
            Ok(count > 0)
        })
        .await?
    }

    /// Inserts a check-in unless one already exists for the same
    /// (student, session, date); repeated calls are no-ops.
    pub async fn record_attendance(
        &self,
        student: &str,
        session: i32,
        on: NaiveDate,
        time_in: Option<NaiveTime>,
    ) -> Result<RecordOutcome, StorageError> {
        use schema::attendance;
        let pool = self.pool.clone();
        let student_owned = student.to_string();
        let time_in = time_in.map(whole_seconds);
        trace!(lrn = %student_owned, session, %on, "record_attendance starting");
        tokio::task::spawn_blocking(move || -> Result<RecordOutcome, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = NewAttendance {
                student_lrn: &student_owned,
                session_id: session,
                date: on,
                time_in,
            };
            let inserted = diesel::insert_into(attendance::table)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(if inserted > 0 {
                RecordOutcome::Recorded
            } else {
                RecordOutcome::AlreadyRecorded
            })
        })
        .await?
    }

    /// Attendees of one session on one date with their check-in times,
    /// earliest first.
    pub async fn attendance_for(
        &self,
        session: i32,
        on: NaiveDate,
    ) -> Result<Vec<(Student, Option<NaiveTime>)>, StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(
            move || -> Result<Vec<(Student, Option<NaiveTime>)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                Ok(load_attendees(&mut conn, session, on)?)
            },
        )
        .await?
    }

    /// Attendees and absentees of one session on one date, read from the
    /// same connection.
    pub async fn roll_call(&self, session: i32, on: NaiveDate) -> Result<Roll, StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Roll, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let attended = load_attendees(&mut conn, session, on)?;
            let universe = load_students(&mut conn)?;
            Ok(take_roll(universe, attended))
        })
        .await?
    }

    pub async fn list_attendance(
        &self,
        session: Option<i32>,
        on: Option<NaiveDate>,
    ) -> Result<Vec<Attendance>, StorageError> {
        use schema::attendance::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Attendance>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut query = attendance.select(Attendance::as_select()).into_boxed::<Sqlite>();
            if let Some(sid) = session {
                query = query.filter(session_id.eq(sid));
            }
            if let Some(d) = on {
                query = query.filter(date.eq(d));
            }
            Ok(query
                .order((date.asc(), session_id.asc(), id.asc()))
                .load::<Attendance>(&mut conn)?)
        })
        .await?
    }

    /// Deletes every attendance record. Returns how many were removed.
    pub async fn purge_attendance(&self) -> Result<usize, StorageError> {
        use schema::attendance::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<usize, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(diesel::delete(attendance).execute(&mut conn)?)
        })
        .await?
    }
}

fn load_students(conn: &mut SqliteConnection) -> Result<Vec<Student>, diesel::result::Error> {
    use schema::students::dsl::*;
    students
        .order((last_name.asc(), first_name.asc(), lrn.asc()))
        .select(Student::as_select())
        .load::<Student>(conn)
}

fn load_attendees(
    conn: &mut SqliteConnection,
    session: i32,
    on: NaiveDate,
) -> Result<Vec<(Student, Option<NaiveTime>)>, diesel::result::Error> {
    use schema::{attendance, students};
    attendance::table
        .inner_join(students::table)
        .filter(attendance::session_id.eq(session))
        .filter(attendance::date.eq(on))
        .order((attendance::time_in.asc(), attendance::id.asc()))
        .select((Student::as_select(), attendance::time_in))
        .load::<(Student, Option<NaiveTime>)>(conn)
}

fn find_identical_session(
    conn: &mut SqliteConnection,
    entry: &SessionEntry,
) -> Result<Option<ClassSession>, diesel::result::Error> {
    use schema::sessions::dsl::*;
    sessions
        .filter(subject.eq(&entry.subject))
        .filter(day.eq(domain::day_number(entry.day)))
        .filter(start_time.eq(whole_seconds(entry.start)))
        .filter(end_time.eq(whole_seconds(entry.end)))
        .filter(teacher_handle.eq(entry.teacher.as_str()))
        .select(ClassSession::as_select())
        .first::<ClassSession>(conn)
        .optional()
}

fn insert_session(
    conn: &mut SqliteConnection,
    entry: &SessionEntry,
) -> Result<ClassSession, StorageError> {
    use schema::sessions::dsl::*;
    use schema::teachers;

    let start = whole_seconds(entry.start);
    let end = whole_seconds(entry.end);
    if start >= end {
        return Err(StorageError::InvalidInput(format!(
            "{entry}: start must be before end"
        )));
    }

    let teacher_rows: i64 = teachers::table
        .filter(teachers::handle.eq(entry.teacher.as_str()))
        .count()
        .get_result(conn)?;
    if teacher_rows == 0 {
        return Err(StorageError::NotFound(format!("teacher {}", entry.teacher)));
    }

    let weekday = domain::day_number(entry.day);
    // Closed intervals: a session ending at 10:00 blocks one starting at 10:00.
    let clash = sessions
        .filter(day.eq(weekday))
        .filter(start_time.le(end))
        .filter(end_time.ge(start))
        .order(start_time.asc())
        .select(ClassSession::as_select())
        .first::<ClassSession>(conn)
        .optional()?;
    if let Some(existing) = clash {
        return Err(StorageError::Conflict(format!(
            "{entry} overlaps {}",
            existing.label()
        )));
    }

    let row = NewClassSession {
        subject: &entry.subject,
        day: weekday,
        start_time: start,
        end_time: end,
        teacher_handle: entry.teacher.as_str(),
    };
    Ok(diesel::insert_into(sessions)
        .values(&row)
        .returning(ClassSession::as_returning())
        .get_result(conn)?)
}

/// Times are stored as `HH:MM:SS` so text comparison in SQLite stays ordered.
fn whole_seconds(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
    Ok(())
}
