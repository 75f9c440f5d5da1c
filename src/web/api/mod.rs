pub mod error;
pub mod satellites;
