//! Per-cavern orchestration
//!
//! - `CavernController`: ties collapse and spawning to the host environment
//! - `ActiveCavernRegistry`: shared view of which hosts have a live cavern
//! - `CavernSnapshot`: persisted runtime state
//! - `CavernEvent`: what happened during a tick

pub mod controller;
pub mod events;
pub mod registry;
pub mod snapshot;

pub use controller::CavernController;
pub use events::CavernEvent;
pub use registry::{ActiveCavernRegistry, RegistryHandle};
pub use snapshot::CavernSnapshot;
