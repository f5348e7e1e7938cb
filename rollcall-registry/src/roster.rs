use std::collections::HashSet;
use std::{env, fs, path::Path};

use rollcall_shared::{SessionEntry, StudentEntry, TeacherEntry};
use serde::{Deserialize, Serialize};

/// Administrative data entry: who teaches, who attends, and the weekly timetable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub teachers: Vec<TeacherEntry>,
    #[serde(default)]
    pub students: Vec<StudentEntry>,
    #[serde(default)]
    pub sessions: Vec<SessionEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid roster: {0}")]
    Invalid(String),
}

impl Roster {
    pub fn load() -> Result<Self, RosterError> {
        let path = env::var("ROSTER_PATH").unwrap_or_else(|_| "roster.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, RosterError> {
        let text = fs::read_to_string(&path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, RosterError> {
        let roster: Roster = serde_yaml::from_str(text)?;
        roster.validate()?;
        Ok(roster)
    }

    /// Checks the invariants the database would otherwise reject half-way
    /// through a seed.
    pub fn validate(&self) -> Result<(), RosterError> {
        let mut handles = HashSet::new();
        for t in &self.teachers {
            if !handles.insert(t.handle.as_str()) {
                return Err(RosterError::Invalid(format!(
                    "duplicate teacher handle {}",
                    t.handle
                )));
            }
        }

        let mut lrns = HashSet::new();
        for s in &self.students {
            if s.lrn.as_str().trim().is_empty() {
                return Err(RosterError::Invalid(format!(
                    "student {} {} has an empty LRN",
                    s.first_name, s.last_name
                )));
            }
            if !lrns.insert(s.lrn.as_str()) {
                return Err(RosterError::Invalid(format!("duplicate LRN {}", s.lrn)));
            }
        }

        for (i, session) in self.sessions.iter().enumerate() {
            if session.start >= session.end {
                return Err(RosterError::Invalid(format!(
                    "{session}: start must be before end"
                )));
            }
            if !handles.contains(session.teacher.as_str()) {
                return Err(RosterError::Invalid(format!(
                    "{session}: unknown teacher {}",
                    session.teacher
                )));
            }
            if let Some(other) = self.sessions[..i]
                .iter()
                .find(|other| other.conflicts_with(session))
            {
                return Err(RosterError::Invalid(format!(
                    "{session} conflicts with {other}"
                )));
            }
        }
        Ok(())
    }
}
