pub mod clickhouse_repo;
pub mod config_files;
pub mod memory;

pub use clickhouse_repo::{location_row, ClickhouseRepo};
pub use config_files::ConfigFileRepository;
pub use memory::{MemoryLocationRepository, MemoryTransitionRepository, MemoryVisitStateRepository};
