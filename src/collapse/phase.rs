use serde::{Deserialize, Serialize};

/// Structural phase of a cavern; ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CollapsePhase {
    Stable,
    PartialCollapse,
    FullCollapse,
    Destroyed,
}

impl CollapsePhase {
    /// Phases in which obstructions are placed
    pub fn is_collapsing(&self) -> bool {
        matches!(self, Self::PartialCollapse | Self::FullCollapse)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::PartialCollapse => "partial collapse",
            Self::FullCollapse => "full collapse",
            Self::Destroyed => "destroyed",
        }
    }
}

impl Default for CollapsePhase {
    fn default() -> Self {
        Self::Stable
    }
}

impl std::fmt::Display for CollapsePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(CollapsePhase::Stable < CollapsePhase::PartialCollapse);
        assert!(CollapsePhase::PartialCollapse < CollapsePhase::FullCollapse);
        assert!(CollapsePhase::FullCollapse < CollapsePhase::Destroyed);
    }

    #[test]
    fn test_collapsing_phases() {
        assert!(!CollapsePhase::Stable.is_collapsing());
        assert!(CollapsePhase::PartialCollapse.is_collapsing());
        assert!(CollapsePhase::FullCollapse.is_collapsing());
        assert!(!CollapsePhase::Destroyed.is_collapsing());
    }
}
