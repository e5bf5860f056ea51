pub mod config;
pub mod error;
pub mod types;

pub use config::CavernConfig;
pub use error::{CavernError, Result};
pub use types::{CellCoord, CreatureKind, EntityId, HostId, Tick};
