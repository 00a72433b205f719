// Domain entities
pub mod geo_ping;
pub mod place;
pub mod records;
pub mod runtime;
pub mod settings;
pub mod visit;

pub use geo_ping::*;
pub use place::*;
pub use records::*;
pub use runtime::*;
pub use settings::*;
pub use visit::*;
