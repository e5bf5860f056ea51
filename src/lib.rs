//! Cavern Collapse - unstable pocket caverns that close up over time
//!
//! A cavern accrues instability every tick. Past the partial threshold it
//! starts dropping rock into open cells, past the full threshold it caves in
//! in batches, and once too little floor is left it is destroyed along with
//! everyone inside. A companion spawn engine scales creature spawns with the
//! same instability.

pub mod cavern;
pub mod collapse;
pub mod core;
pub mod environment;
pub mod spatial;
pub mod spawning;
