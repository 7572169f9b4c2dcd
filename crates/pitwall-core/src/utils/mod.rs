//! Utility functions for string formatting.

pub mod format;

pub use format::{age_display, format_race_date, truncate_string};
