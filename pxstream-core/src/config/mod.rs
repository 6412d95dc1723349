mod settings;
mod stream_config;

pub use settings::{SettingsLookup, keys};
pub use stream_config::{RetryPolicy, StreamConfig};
