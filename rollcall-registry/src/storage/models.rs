use crate::storage::schema::{attendance, sessions, students, teachers};
use chrono::{NaiveDate, NaiveTime, Weekday};
use diesel::prelude::*;
use rollcall_shared::domain::{self, Lrn};

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = students)]
#[diesel(primary_key(lrn))]
pub struct Student {
    pub lrn: String,
    pub first_name: String,
    pub last_name: String,
    pub guardian_phone_number: String,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn lrn(&self) -> Lrn {
        Lrn(self.lrn.clone())
    }
}

#[derive(Insertable)]
#[diesel(table_name = students)]
pub struct NewStudent<'a> {
    pub lrn: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub guardian_phone_number: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = teachers)]
#[diesel(primary_key(handle))]
pub struct Teacher {
    pub handle: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
}

impl Teacher {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Insertable)]
#[diesel(table_name = teachers)]
pub struct NewTeacher<'a> {
    pub handle: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone_number: &'a str,
}

/// A recurring weekly class slot.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = sessions)]
#[diesel(belongs_to(Teacher, foreign_key = teacher_handle))]
pub struct ClassSession {
    pub id: i32,
    pub subject: String,
    pub day: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub teacher_handle: String,
}

impl ClassSession {
    pub fn weekday(&self) -> Option<Weekday> {
        domain::weekday_from_number(self.day)
    }

    /// Half-open activity window: a session is current from its start up to,
    /// but not including, its end.
    pub fn is_active_at(&self, day: Weekday, time: NaiveTime) -> bool {
        self.day == domain::day_number(day) && self.start_time <= time && time < self.end_time
    }

    pub fn label(&self) -> String {
        let day = self.weekday().map(domain::day_name).unwrap_or("?");
        format!(
            "{} ({} {} - {})",
            self.subject,
            day,
            domain::short_time(self.start_time),
            domain::short_time(self.end_time)
        )
    }
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewClassSession<'a> {
    pub subject: &'a str,
    pub day: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub teacher_handle: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = attendance)]
#[diesel(belongs_to(Student, foreign_key = student_lrn))]
#[diesel(belongs_to(ClassSession, foreign_key = session_id))]
pub struct Attendance {
    pub id: i32,
    pub student_lrn: String,
    pub session_id: i32,
    pub date: NaiveDate,
    pub time_in: Option<NaiveTime>,
}

#[derive(Insertable)]
#[diesel(table_name = attendance)]
pub struct NewAttendance<'a> {
    pub student_lrn: &'a str,
    pub session_id: i32,
    pub date: NaiveDate,
    pub time_in: Option<NaiveTime>,
}
