pub mod detection_commands;
pub mod ingest_commands;
pub mod place_commands;
pub mod settings_commands;

pub use detection_commands::{process_ping, PingOutcome, MAX_DETECTION_ATTEMPTS};
pub use ingest_commands::{check_in, ingest_pings, IngestSummary};
pub use place_commands::reload_places;
pub use settings_commands::replace_detection_settings;
