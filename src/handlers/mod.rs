//! Thin HTTP handlers (C11, §4.11): validate input, call a core function,
//! translate the result to HTTP. No business logic lives here.

pub mod categorization;
pub mod cron;
pub mod health;
pub mod instagram;
pub mod subreddits;
