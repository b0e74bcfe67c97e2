pub mod file_selector;
pub mod scanner;
