//! The frontend-facing api application

pub mod urls;
