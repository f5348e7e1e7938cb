//! Attendee/absentee partition for one session on one date.
//!
//! There is no enrollment roster: every registered student is a candidate
//! for every session, so anyone without a record is counted absent.

use std::collections::HashSet;

use chrono::NaiveTime;

use crate::storage::models::Student;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roll {
    /// Students with a record, in check-in order.
    pub present: Vec<(Student, Option<NaiveTime>)>,
    /// Everyone else, in the order of the student universe.
    pub absent: Vec<Student>,
}

impl Roll {
    pub fn headcount(&self) -> usize {
        self.present.len() + self.absent.len()
    }
}

/// Splits `universe` into those present in `attended` and the rest.
///
/// Attendees missing from `universe` are still reported present; a student
/// never appears on both sides.
pub fn take_roll(universe: Vec<Student>, attended: Vec<(Student, Option<NaiveTime>)>) -> Roll {
    let mut seen: HashSet<String> = HashSet::with_capacity(attended.len());
    let mut present = Vec::with_capacity(attended.len());
    for (student, time_in) in attended {
        if seen.insert(student.lrn.clone()) {
            present.push((student, time_in));
        }
    }
    let absent = universe
        .into_iter()
        .filter(|s| !seen.contains(&s.lrn))
        .collect();
    Roll { present, absent }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(lrn: &str) -> Student {
        Student {
            lrn: lrn.into(),
            first_name: format!("First{lrn}"),
            last_name: format!("Last{lrn}"),
            guardian_phone_number: "+639170000000".into(),
        }
    }

    #[test]
    fn partition_covers_universe_without_overlap() {
        let universe: Vec<Student> = ["1", "2", "3", "4"].iter().map(|l| student(l)).collect();
        let t = NaiveTime::from_hms_opt(9, 15, 0);
        let roll = take_roll(
            universe.clone(),
            vec![(student("3"), t), (student("1"), t)],
        );

        let present: HashSet<_> = roll.present.iter().map(|(s, _)| s.lrn.clone()).collect();
        let absent: HashSet<_> = roll.absent.iter().map(|s| s.lrn.clone()).collect();
        let all: HashSet<_> = universe.iter().map(|s| s.lrn.clone()).collect();

        assert!(present.is_disjoint(&absent));
        assert_eq!(&present | &absent, all);
        assert_eq!(roll.headcount(), 4);
        assert_eq!(roll.present[0].0.lrn, "3");
    }

    #[test]
    fn empty_attendance_means_everyone_absent() {
        let roll = take_roll(vec![student("1"), student("2")], Vec::new());
        assert!(roll.present.is_empty());
        assert_eq!(roll.absent.len(), 2);
    }

    #[test]
    fn repeated_attendee_is_listed_once() {
        let t = NaiveTime::from_hms_opt(9, 0, 0);
        let roll = take_roll(vec![student("1")], vec![(student("1"), t), (student("1"), t)]);
        assert_eq!(roll.present.len(), 1);
        assert!(roll.absent.is_empty());
    }
}
