//! Installed applications

pub mod api;
