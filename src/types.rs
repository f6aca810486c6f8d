use serde::Serialize;

/// Index of an insurance plan inside a `YearSimulator`, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PlanId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GeneratorId(pub usize);

/// Zero-based trial number. Each trial draws from its own random stream,
/// keyed by this number, so a trial can be replayed in isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TrialId(pub u64);

impl TrialId {
    pub fn next(self) -> Self {
        TrialId(self.0 + 1)
    }
}
