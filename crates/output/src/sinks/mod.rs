//! Reference writers

mod file;
mod log;

pub use file::{FileWriter, FileWriterConfig};
pub use log::LogWriter;
