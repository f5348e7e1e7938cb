pub mod domain;

pub use domain::{
    Lrn, PhoneNumber, PhoneNumberError, SessionEntry, StudentEntry, TeacherEntry, TeacherHandle,
};
