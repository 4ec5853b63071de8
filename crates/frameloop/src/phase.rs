//! Tick phases - named lanes within a simulation tick.
//!
//! The phase set is fixed when a scheduler is constructed and indexed
//! contiguously from zero. Per-phase lane arrays are sized exactly to
//! the phase count, so a `Phase` is just a checked index.

use std::fmt;

/// Identifier for one ticking lane of a scheduler.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Phase(u8);

impl Phase {
    /// First lane of the conventional logic/physics split.
    pub const LOGIC: Phase = Phase(0);
    /// Second lane of the conventional logic/physics split.
    pub const PHYSICS: Phase = Phase(1);

    /// Create a phase from its lane index.
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// The lane index of this phase.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase{}", self.0)
    }
}

/// The named phases a scheduler was configured with.
///
/// Ordering between phases within one tick is the order of this set;
/// hosts tick the lanes in index order.
pub struct PhaseSet {
    names: Box<[Box<str>]>,
}

impl PhaseSet {
    /// Build a phase set from ordered lane names.
    ///
    /// # Panics
    ///
    /// Panics if more than 256 phases are requested.
    #[must_use]
    pub fn new(names: &[&str]) -> Self {
        assert!(
            names.len() <= usize::from(u8::MAX) + 1,
            "phase count exceeds the u8 index space"
        );
        Self {
            names: names.iter().map(|name| Box::from(*name)).collect(),
        }
    }

    /// The conventional two-lane logic/physics split.
    #[must_use]
    pub fn logic_physics() -> Self {
        Self::new(&["logic", "physics"])
    }

    /// Number of configured phases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no phases are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether `phase` falls inside the configured set.
    #[must_use]
    pub fn contains(&self, phase: Phase) -> bool {
        phase.index() < self.names.len()
    }

    /// The name of a configured phase.
    #[must_use]
    pub fn name(&self, phase: Phase) -> Option<&str> {
        self.names.get(phase.index()).map(AsRef::as_ref)
    }

    /// Look up a phase by its lane name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Phase> {
        self.names
            .iter()
            .position(|n| n.as_ref() == name)
            .map(|index| Phase(index as u8))
    }

    /// Iterate the phases in tick order.
    pub fn iter(&self) -> impl Iterator<Item = Phase> + '_ {
        (0..self.names.len()).map(|index| Phase(index as u8))
    }
}

impl fmt::Debug for PhaseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names.iter()).finish()
    }
}
