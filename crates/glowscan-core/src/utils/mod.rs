//! Utility functions for string formatting and manipulation.

pub mod format;

pub use format::{eq_ignore_case, format_remaining, truncate_string};
