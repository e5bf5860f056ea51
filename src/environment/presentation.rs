//! Presentation hooks (effects, sounds, letters) the cavern fires into

use crate::collapse::phase::CollapsePhase;
use crate::core::error::Result;
#[cfg(test)]
use crate::core::error::CavernError;
use crate::core::types::{CellCoord, EntityId};

/// Fire-and-forget presentation calls; failures are logged and ignored
pub trait PresentationService {
    /// Ambient effect for the active fraction bracket
    fn ambient_effect(&mut self, bracket: usize, fraction: f32) -> Result<()>;

    fn phase_changed(&mut self, from: CollapsePhase, to: CollapsePhase) -> Result<()>;

    /// Dust and rumble after a completed mining job
    fn mining_flavor(&mut self, cell: Option<CellCoord>) -> Result<()>;

    /// An occupant was caught under a forced collapse
    fn occupant_crushed(&mut self, id: EntityId, cell: CellCoord) -> Result<()>;

    fn cavern_destroyed(&mut self) -> Result<()>;
}

/// Presentation that does nothing (headless runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPresentation;

impl PresentationService for NullPresentation {
    fn ambient_effect(&mut self, _bracket: usize, _fraction: f32) -> Result<()> {
        Ok(())
    }

    fn phase_changed(&mut self, _from: CollapsePhase, _to: CollapsePhase) -> Result<()> {
        Ok(())
    }

    fn mining_flavor(&mut self, _cell: Option<CellCoord>) -> Result<()> {
        Ok(())
    }

    fn occupant_crushed(&mut self, _id: EntityId, _cell: CellCoord) -> Result<()> {
        Ok(())
    }

    fn cavern_destroyed(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Presentation whose every call fails; counts the attempts
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingPresentation {
    pub calls: usize,
}

#[cfg(test)]
impl FailingPresentation {
    fn fail(&mut self) -> Result<()> {
        self.calls += 1;
        Err(CavernError::Service("presentation offline".into()))
    }
}

#[cfg(test)]
impl PresentationService for FailingPresentation {
    fn ambient_effect(&mut self, _bracket: usize, _fraction: f32) -> Result<()> {
        self.fail()
    }

    fn phase_changed(&mut self, _from: CollapsePhase, _to: CollapsePhase) -> Result<()> {
        self.fail()
    }

    fn mining_flavor(&mut self, _cell: Option<CellCoord>) -> Result<()> {
        self.fail()
    }

    fn occupant_crushed(&mut self, _id: EntityId, _cell: CellCoord) -> Result<()> {
        self.fail()
    }

    fn cavern_destroyed(&mut self) -> Result<()> {
        self.fail()
    }
}
