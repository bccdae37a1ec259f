//! Library exports for the command-line front end, benchmarks and tests.
/// Application data directory helpers.
pub mod app_dirs;
/// Shared HTTP agent.
pub(crate) mod http_client;
/// Model downloads and the installed-model inventory.
pub mod installer;
/// Tracing setup with rotating log files.
pub mod logging;
/// Folder dialog capability.
pub mod picker;
/// Prompt-seeded placeholder images.
pub mod placeholder;
/// Persisted user settings.
pub mod settings;
