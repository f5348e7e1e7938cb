use chrono::{NaiveDate, NaiveTime, Weekday};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"The database path can also be provided via environment:
  DB_PATH     (default: data/rollcall.db)
  ROSTER_PATH (default: roster.yaml) when `seed` is given no file

The kiosk reads the same database; run `seed` before the first class of the
term and `purge --yes` to clear attendance between terms.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "rollcall-registry",
    version,
    about = "Roster, timetable and attendance administration for the roll-call kiosk",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to the SQLite database
    #[arg(long)]
    pub db: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load teachers, students and sessions from a roster YAML file
    Seed {
        /// Roster file (teachers, students, sessions); defaults to $ROSTER_PATH or roster.yaml
        roster: Option<PathBuf>,
    },
    /// Add one weekly session; rejected if it overlaps another on the same day
    AddSession {
        #[arg(long)]
        subject: String,
        /// Day of week, e.g. monday
        #[arg(long)]
        day: Weekday,
        /// Start time, HH:MM[:SS]
        #[arg(long)]
        start: NaiveTime,
        /// End time, HH:MM[:SS]
        #[arg(long)]
        end: NaiveTime,
        /// Teacher handle as used in the roster
        #[arg(long)]
        teacher: String,
    },
    /// List the weekly timetable
    Schedule {
        #[arg(long)]
        day: Option<Weekday>,
    },
    /// Show the current and previous session for a day and time (default: now)
    Status {
        #[arg(long)]
        day: Option<Weekday>,
        #[arg(long)]
        time: Option<NaiveTime>,
    },
    /// Show attendance; with --session, print present and absent students
    Attendance {
        #[arg(long)]
        session: Option<i32>,
        /// Date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Delete all attendance records
    Purge {
        /// Confirm the purge
        #[arg(long)]
        yes: bool,
    },
}
