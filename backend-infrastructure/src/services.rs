pub mod health_service;
pub mod place_index;
pub mod webhook_publisher;

pub use health_service::*;
pub use place_index::*;
pub use webhook_publisher::*;
