use std::fmt;

use serde::Serialize;

use crate::claim::Claim;
use crate::error::ValidationError;

/// Where a payment was drawn from within the waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    Premium,
    Uncovered,
    Deductible,
    CoinsuranceCovered,
    CopayCovered,
    Oop,
    OopMax,
    /// Reserved: never produced by the waterfall.
    BalanceBilling,
}

impl PaymentSource {
    /// Whether an individually-borne payment from this source counts toward
    /// the out-of-pocket maximum. Uncovered spend does; the premium and
    /// balance billing do not.
    pub fn counts_toward_oop(self) -> bool {
        !matches!(self, PaymentSource::Premium | PaymentSource::BalanceBilling)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentSource::Premium => "premium",
            PaymentSource::Uncovered => "uncovered",
            PaymentSource::Deductible => "deductible",
            PaymentSource::CoinsuranceCovered => "coinsurance_covered",
            PaymentSource::CopayCovered => "copay_covered",
            PaymentSource::Oop => "oop",
            PaymentSource::OopMax => "oop_max",
            PaymentSource::BalanceBilling => "balance_billing",
        }
    }
}

impl fmt::Display for PaymentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment made by either the insurer or the insured. A claim usually
/// produces several, one per waterfall stage that touched it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    /// `None` only for the premium.
    pub claim: Option<Claim>,
    pub source: PaymentSource,
    pub covered_by_insurer: bool,
    pub amount: f64,
}

impl Payment {
    pub fn new(
        claim: Option<Claim>,
        source: PaymentSource,
        covered_by_insurer: bool,
        amount: f64,
    ) -> Result<Self, ValidationError> {
        if !(amount > 0.0 && amount.is_finite()) {
            return Err(ValidationError::NonPositivePayment(amount));
        }
        if source == PaymentSource::Premium {
            if covered_by_insurer {
                return Err(ValidationError::CoveredPremium);
            }
        } else if claim.is_none() {
            return Err(ValidationError::MissingClaim);
        }
        Ok(Payment { claim, source, covered_by_insurer, amount })
    }

    pub fn premium(amount: f64) -> Result<Self, ValidationError> {
        Self::new(None, PaymentSource::Premium, false, amount)
    }

    pub fn is_individual(&self) -> bool {
        !self.covered_by_insurer
    }
}

impl fmt::Display for Payment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = if self.covered_by_insurer { "Insurance pays" } else { "You pay" };
        match &self.claim {
            None => write!(f, "{who} {} {:.2}", self.source, self.amount),
            Some(claim) => write!(
                f,
                "{who} {} [{}] in {}: {:.2}",
                claim.category, claim.name, self.source, self.amount
            ),
        }
    }
}

/// Append-only record of one plan's payments for one year.
///
/// Running totals are recomputed from the entries on demand, so the ledger
/// is the only state the waterfall carries between claims.
#[derive(Debug, Clone, Default)]
pub struct PaymentLedger {
    payments: Vec<Payment>,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a waterfall payment. Zero amounts are not recorded.
    pub(crate) fn record(
        &mut self,
        claim: &Claim,
        source: PaymentSource,
        covered_by_insurer: bool,
        amount: f64,
    ) {
        if amount > 0.0 {
            self.payments.push(Payment {
                claim: Some(claim.clone()),
                source,
                covered_by_insurer,
                amount,
            });
        }
    }

    pub(crate) fn record_premium(&mut self, amount: f64) {
        if let Ok(payment) = Payment::premium(amount) {
            self.payments.push(payment);
        }
    }

    /// Deductible consumed so far this year.
    pub fn deductible_paid(&self) -> f64 {
        self.sum(|p| p.is_individual() && p.source == PaymentSource::Deductible)
    }

    /// Individually-borne spend that counts toward the out-of-pocket maximum.
    pub fn oop_paid(&self) -> f64 {
        self.sum(|p| p.is_individual() && p.source.counts_toward_oop())
    }

    /// Everything the insured paid, premium included.
    pub fn individual_total(&self) -> f64 {
        self.sum(Payment::is_individual)
    }

    pub fn insurer_total(&self) -> f64 {
        self.sum(|p| p.covered_by_insurer)
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn into_payments(self) -> Vec<Payment> {
        self.payments
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }

    fn sum(&self, pred: impl Fn(&Payment) -> bool) -> f64 {
        self.payments.iter().filter(|&p| pred(p)).map(|p| p.amount).sum()
    }
}
