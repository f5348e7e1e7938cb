use rollcall_registry::roster::Roster;
use rollcall_registry::storage::{self, Store, StorageError};
use rollcall_shared::{SessionEntry, TeacherHandle, domain};
mod cli;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    use clap::Parser;
    let args = cli::Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(true)
        .init();

    let db_path = args
        .db
        .map(|p| p.to_string_lossy().into_owned())
        .or_else(|| std::env::var("DB_PATH").ok())
        .unwrap_or_else(|| "data/rollcall.db".into());
    // Ensure data dir exists when using default
    if let Some(parent) = std::path::Path::new(&db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        let _ = std::fs::create_dir_all(parent);
    }
    let store = match Store::connect_sqlite(&db_path).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error=%e, path=%db_path, "Failed to connect DB");
            std::process::exit(3);
        }
    };

    if let Err(e) = execute(&store, args.command).await {
        tracing::error!(error=%e, "command failed");
        std::process::exit(match e {
            CommandError::Storage(StorageError::Conflict(_)) => 5,
            CommandError::Roster(_) | CommandError::Usage(_) => 2,
            CommandError::Storage(_) => 4,
        });
    }
}

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("roster error: {0}")]
    Roster(#[from] rollcall_registry::roster::RosterError),
    #[error("{0}")]
    Usage(String),
}

async fn execute(store: &Store, command: cli::Command) -> Result<(), CommandError> {
    match command {
        cli::Command::Seed { roster } => {
            let roster = match roster {
                Some(path) => Roster::load_from_path(&path)?,
                None => Roster::load()?,
            };
            let summary = store.seed_roster(&roster).await?;
            println!(
                "seeded {} teachers, {} students; {} sessions added, {} unchanged",
                summary.teachers,
                summary.students,
                summary.sessions_added,
                summary.sessions_unchanged
            );
        }
        cli::Command::AddSession {
            subject,
            day,
            start,
            end,
            teacher,
        } => {
            let entry = SessionEntry {
                subject,
                day,
                start,
                end,
                teacher: TeacherHandle(teacher),
            };
            let created = store.add_session(&entry).await?;
            println!("added session {}: {}", created.id, created.label());
        }
        cli::Command::Schedule { day } => {
            for s in store.list_sessions(day).await? {
                println!("{:>4}  {}  [{}]", s.id, s.label(), s.teacher_handle);
            }
        }
        cli::Command::Status { day, time } => {
            let now = chrono::Local::now().naive_local();
            let day = day.unwrap_or_else(|| chrono::Datelike::weekday(&now));
            let time = time.unwrap_or_else(|| now.time());
            print_slot("current", store.session_active_at(day, time).await?);
            print_slot("previous", store.session_before(day, time).await?);
        }
        cli::Command::Attendance {
            session: Some(session_id),
            date,
        } => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let session = store
                .get_session(session_id)
                .await?
                .ok_or_else(|| CommandError::Usage(format!("no session with id {session_id}")))?;
            let roll = store.roll_call(session_id, date).await?;
            println!("{} on {}", session.label(), domain::long_date(date));
            println!("Present ({}):", roll.present.len());
            for (student, time_in) in &roll.present {
                let at = time_in
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".into());
                println!("  {} ({}) - {}", student.full_name(), student.lrn, at);
            }
            println!("Absent ({}):", roll.absent.len());
            for student in &roll.absent {
                println!("  {} ({})", student.full_name(), student.lrn);
            }
        }
        cli::Command::Attendance {
            session: None,
            date,
        } => {
            for record in store.list_attendance(None, date).await? {
                let at = record
                    .time_in
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:>6}  {}  session {:>4}  {}  {}",
                    record.id, record.date, record.session_id, record.student_lrn, at
                );
            }
        }
        cli::Command::Purge { yes } => {
            if !yes {
                return Err(CommandError::Usage(
                    "refusing to purge attendance without --yes".into(),
                ));
            }
            let removed = store.purge_attendance().await?;
            tracing::warn!(removed, "attendance purged");
            println!("removed {removed} attendance records");
        }
    }
    Ok(())
}

fn print_slot(label: &str, slot: Option<storage::models::ClassSession>) {
    match slot {
        Some(s) => println!("{label}: {} [{}]", s.label(), s.teacher_handle),
        None => println!("{label}: none"),
    }
}
