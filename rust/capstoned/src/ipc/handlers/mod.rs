pub mod core;
pub mod grades;
pub mod marks;
pub mod registration;
pub mod rubrics;
