// Pure detection services
pub mod candidate_tracker;
pub mod place_matching;
pub mod staleness_sweeper;
pub mod visit_detector;
pub mod visit_lifecycle;

pub use candidate_tracker::*;
pub use place_matching::*;
pub use staleness_sweeper::*;
pub use visit_detector::*;
pub use visit_lifecycle::*;
