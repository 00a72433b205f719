pub mod context;
pub mod lifecycle;

pub use context::{assemble_state, AppContext, Ports};
pub use lifecycle::{build_router_with_layers, run_standalone, HttpLimits};
