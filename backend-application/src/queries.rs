pub mod settings_queries;
pub mod visit_queries;

pub use settings_queries::{effective_settings, settings_document};
pub use visit_queries::{current_visit, list_transitions, list_visits};
