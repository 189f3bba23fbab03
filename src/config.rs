//! Project configuration: settings and the root URL configuration

pub mod settings;
pub mod urls;

pub use settings::{Settings, UserSeed};
