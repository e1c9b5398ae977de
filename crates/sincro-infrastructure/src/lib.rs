pub mod paths;
pub mod settings;

pub use crate::paths::SincroPaths;
pub use crate::settings::{ClientSettings, ReconnectSettings, SettingsStore};
