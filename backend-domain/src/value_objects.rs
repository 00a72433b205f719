// Domain value objects
pub mod geo_point;
pub mod ping_source;
pub mod visit_kind;

pub use geo_point::*;
pub use ping_source::*;
pub use visit_kind::*;
