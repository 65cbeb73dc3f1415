// Configuration loading

pub mod ai;
pub mod settings;

pub use ai::{AIConfigStatus, ResolvedAIConfig};
pub use settings::{AIProvider, AISettings, BusyPolicy, Settings};
