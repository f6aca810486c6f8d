use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::categories::Category;
use crate::error::ValidationError;

/// A claim for insurance coverage.
///
/// `oop_amount` is the billed charge before any negotiated discount;
/// `negotiated_amount` is what is actually owed and is the basis of the
/// payment waterfall.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claim {
    /// Name of the claim generator (or caller) that produced the claim.
    pub name: Arc<str>,
    pub category: Category,
    pub oop_amount: f64,
    pub negotiated_amount: f64,
}

impl Claim {
    pub fn new(
        name: impl Into<Arc<str>>,
        category: Category,
        oop_amount: f64,
        negotiated_amount: f64,
    ) -> Result<Self, ValidationError> {
        check_amount("oop_amount", oop_amount)?;
        check_amount("negotiated_amount", negotiated_amount)?;
        Ok(Claim { name: name.into(), category, oop_amount, negotiated_amount })
    }

    /// The provider discount implied by the two amounts, in `[0, 1]` when
    /// the negotiated amount does not exceed the billed charge.
    pub fn discount(&self) -> f64 {
        if self.oop_amount == 0.0 {
            0.0
        } else {
            1.0 - self.negotiated_amount / self.oop_amount
        }
    }
}

pub(crate) fn check_amount(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::InvalidAmount { field, value })
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Claim for {} [{}]: ${:.2}/${:.2}",
            self.category, self.name, self.oop_amount, self.negotiated_amount
        )
    }
}
