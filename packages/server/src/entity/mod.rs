pub mod dead_letter_message;
pub mod problem;
pub mod submission;
pub mod test_case;
pub mod test_case_result;
pub mod user;
