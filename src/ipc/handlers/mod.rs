pub mod attendance;
pub mod classes;
pub mod core;
pub mod exams;
pub mod fees;
pub mod results;
pub mod settings;
pub mod students;
pub mod subjects;
pub mod teachers;
pub mod users;
