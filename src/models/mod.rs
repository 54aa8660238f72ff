pub mod inference;
pub mod job;
pub mod result;
