pub mod roll;
pub mod roster;
pub mod storage;
