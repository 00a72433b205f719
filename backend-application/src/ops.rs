pub mod publish_queue;
pub mod publisher_fanout;
pub mod settings_provider;
pub mod user_locks;
pub mod visit_stream_hub;

pub use publish_queue::VisitPublishQueue;
pub use publisher_fanout::FanoutPublisher;
pub use settings_provider::SettingsProvider;
pub use user_locks::UserLocks;
pub use visit_stream_hub::VisitStreamHub;
