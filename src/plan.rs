//! Insurance plans and the payment waterfall.
//!
//! A plan pays a year of claims one at a time. Each covered claim's
//! negotiated amount flows through three stages (deductible, coinsurance or
//! copay, out-of-pocket maximum), each of which records payments in the
//! year's ledger and passes on the amount still owed by the insured. Later
//! claims see the deductible and out-of-pocket totals left by earlier ones,
//! so the order claims arrive in matters.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::categories::{Category, CategoryRegistry};
use crate::claim::{Claim, check_amount};
use crate::error::{ConfigurationError, Error, ValidationError};
use crate::payment::{Payment, PaymentLedger, PaymentSource};

/// How the insured shares a covered cost once the deductible is met.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostShare {
    /// Fraction of the cost borne by the insured.
    Coinsurance(f64),
    /// Flat amount borne by the insured per claim.
    Copay(f64),
}

/// Raw coverage terms as supplied by a plan definition. Turned into a
/// `Coverage` by `Coverage::new`, which enforces the invariants.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoverageTerms {
    pub covered: bool,
    pub no_deductible: bool,
    pub coinsurance: Option<f64>,
    pub copay: Option<f64>,
}

impl CoverageTerms {
    pub fn coinsurance(rate: f64) -> Self {
        CoverageTerms { covered: true, coinsurance: Some(rate), ..Default::default() }
    }

    pub fn copay(amount: f64) -> Self {
        CoverageTerms { covered: true, copay: Some(amount), ..Default::default() }
    }

    pub fn uncovered() -> Self {
        CoverageTerms::default()
    }

    pub fn without_deductible(mut self) -> Self {
        self.no_deductible = true;
        self
    }
}

/// Check `terms` for `category` against the registry and the cost-share
/// rules, returning the validated category.
pub fn validate_coverage(
    registry: &CategoryRegistry,
    category: &str,
    terms: &CoverageTerms,
) -> Result<Category, ValidationError> {
    let category = registry.category(category)?;
    cost_share(&category, terms)?;
    Ok(category)
}

fn cost_share(category: &Category, terms: &CoverageTerms) -> Result<Option<CostShare>, ValidationError> {
    let name = || category.to_string();
    if !terms.covered {
        if terms.coinsurance.is_some() || terms.copay.is_some() {
            return Err(ValidationError::TermsOnUncovered(name()));
        }
        return Ok(None);
    }
    match (terms.coinsurance, terms.copay) {
        (Some(_), Some(_)) => Err(ValidationError::CoinsuranceAndCopay(name())),
        (None, None) => Err(ValidationError::MissingCostShare(name())),
        (Some(rate), None) => {
            if (0.0..=1.0).contains(&rate) {
                Ok(Some(CostShare::Coinsurance(rate)))
            } else {
                Err(ValidationError::CoinsuranceOutOfRange { category: name(), value: rate })
            }
        }
        (None, Some(copay)) => {
            if copay >= 0.0 && copay.is_finite() {
                Ok(Some(CostShare::Copay(copay)))
            } else {
                Err(ValidationError::NegativeCopay { category: name(), value: copay })
            }
        }
    }
}

/// A plan's coverage parameters for one category of claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coverage {
    category: Category,
    no_deductible: bool,
    /// `None` when the category is not covered at all.
    share: Option<CostShare>,
}

impl Coverage {
    pub fn new(
        registry: &CategoryRegistry,
        category: &str,
        terms: CoverageTerms,
    ) -> Result<Self, ValidationError> {
        let category = validate_coverage(registry, category, &terms)?;
        Self::for_category(category, terms)
    }

    /// Build coverage for an already-validated category.
    pub fn for_category(category: Category, terms: CoverageTerms) -> Result<Self, ValidationError> {
        let share = cost_share(&category, &terms)?;
        Ok(Coverage { category, no_deductible: terms.no_deductible, share })
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn is_covered(&self) -> bool {
        self.share.is_some()
    }

    pub fn no_deductible(&self) -> bool {
        self.no_deductible
    }

    pub fn cost_share(&self) -> Option<CostShare> {
        self.share
    }

    pub fn coinsurance(&self) -> Option<f64> {
        match self.share {
            Some(CostShare::Coinsurance(rate)) => Some(rate),
            _ => None,
        }
    }

    pub fn copay(&self) -> Option<f64> {
        match self.share {
            Some(CostShare::Copay(amount)) => Some(amount),
            _ => None,
        }
    }
}

/// An insurance plan: fixed annual premium, deductible, out-of-pocket
/// maximum and per-category coverage.
#[derive(Debug, Clone)]
pub struct InsurancePlan {
    name: String,
    premium: f64,
    deductible: f64,
    oop_max: f64,
    coverages: BTreeMap<Category, Coverage>,
}

impl InsurancePlan {
    pub fn new(
        name: impl Into<String>,
        premium: f64,
        deductible: f64,
        oop_max: f64,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        check_amount("premium", premium)?;
        check_amount("deductible", deductible)?;
        check_amount("oop_max", oop_max)?;
        if deductible > oop_max {
            return Err(ValidationError::DeductibleAboveOopMax { plan: name, deductible, oop_max });
        }
        if premium == 0.0 {
            warn!(plan = %name, "plan has no premium");
        }
        Ok(InsurancePlan { name, premium, deductible, oop_max, coverages: BTreeMap::new() })
    }

    /// Register coverage for a category. Each category may be covered once.
    pub fn add_coverage(&mut self, coverage: Coverage) -> Result<(), ConfigurationError> {
        if self.coverages.contains_key(coverage.category()) {
            return Err(ConfigurationError::DuplicateCoverage {
                plan: self.name.clone(),
                category: coverage.category().to_string(),
            });
        }
        self.coverages.insert(coverage.category().clone(), coverage);
        Ok(())
    }

    /// Validate and register coverage in one step.
    pub fn cover(
        &mut self,
        registry: &CategoryRegistry,
        category: &str,
        terms: CoverageTerms,
    ) -> Result<(), Error> {
        self.add_coverage(Coverage::new(registry, category, terms)?)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn premium(&self) -> f64 {
        self.premium
    }

    pub fn deductible(&self) -> f64 {
        self.deductible
    }

    pub fn oop_max(&self) -> f64 {
        self.oop_max
    }

    pub fn coverage(&self, category: &Category) -> Option<&Coverage> {
        self.coverages.get(category)
    }

    pub fn coverages(&self) -> impl Iterator<Item = &Coverage> {
        self.coverages.values()
    }

    /// Pay a full year of claims in the given order, starting from an empty
    /// ledger. The premium is the first payment.
    pub fn pay_year(&self, claims: &[Claim]) -> Result<Vec<Payment>, ConfigurationError> {
        Ok(self.pay_year_ledger(claims)?.into_payments())
    }

    pub fn pay_year_ledger(&self, claims: &[Claim]) -> Result<PaymentLedger, ConfigurationError> {
        let mut ledger = PaymentLedger::new();
        ledger.record_premium(self.premium);
        for claim in claims {
            self.pay(&mut ledger, claim)?;
        }
        Ok(ledger)
    }

    /// Pay a single claim against the year so far.
    pub fn pay(&self, ledger: &mut PaymentLedger, claim: &Claim) -> Result<(), ConfigurationError> {
        let coverage = self.coverages.get(&claim.category).ok_or_else(|| {
            ConfigurationError::MissingCoverage {
                plan: self.name.clone(),
                category: claim.category.to_string(),
            }
        })?;

        let to_pay = claim.negotiated_amount;
        if !coverage.is_covered() {
            ledger.record(claim, PaymentSource::Uncovered, false, to_pay);
            return Ok(());
        }

        let to_pay = self.pay_from_deductible(ledger, to_pay, claim, coverage);
        let to_pay = self.pay_coverage(ledger, to_pay, claim, coverage);
        self.pay_oop(ledger, to_pay, claim);
        Ok(())
    }

    /// Charge the insured toward the deductible. Returns the amount left.
    ///
    /// The charge never takes the insured past the out-of-pocket maximum;
    /// whatever the cap holds back is passed on with the rest.
    pub fn pay_from_deductible(
        &self,
        ledger: &mut PaymentLedger,
        to_pay: f64,
        claim: &Claim,
        coverage: &Coverage,
    ) -> f64 {
        if coverage.no_deductible() || to_pay <= 0.0 {
            return to_pay;
        }

        let used = ledger.deductible_paid();
        if used >= self.deductible {
            return to_pay;
        }

        let due = (self.deductible - used).min(to_pay);
        let headroom = (self.oop_max - ledger.oop_paid()).max(0.0);
        let charged = due.min(headroom);
        ledger.record(claim, PaymentSource::Deductible, false, charged);
        to_pay - charged
    }

    /// Split the remainder between insurer and insured according to the
    /// coverage's coinsurance or copay. Returns the insured's share.
    pub fn pay_coverage(
        &self,
        ledger: &mut PaymentLedger,
        to_pay: f64,
        claim: &Claim,
        coverage: &Coverage,
    ) -> f64 {
        if to_pay <= 0.0 {
            return to_pay;
        }

        match coverage.cost_share() {
            Some(CostShare::Coinsurance(rate)) => {
                // Whole currency units, half up; never more than is owed.
                let insured = (to_pay * rate).round().min(to_pay);
                ledger.record(claim, PaymentSource::CoinsuranceCovered, true, to_pay - insured);
                insured
            }
            Some(CostShare::Copay(copay)) => {
                if to_pay > copay {
                    ledger.record(claim, PaymentSource::CopayCovered, true, to_pay - copay);
                    copay
                } else {
                    ledger.record(claim, PaymentSource::CopayCovered, true, to_pay);
                    0.0
                }
            }
            None => to_pay,
        }
    }

    /// Settle the insured's remaining share out of pocket, with anything
    /// above the out-of-pocket maximum covered by the insurer.
    pub fn pay_oop(&self, ledger: &mut PaymentLedger, to_pay: f64, claim: &Claim) {
        if to_pay <= 0.0 {
            return;
        }

        let headroom = self.oop_max - ledger.oop_paid();
        if headroom <= 0.0 {
            ledger.record(claim, PaymentSource::OopMax, true, to_pay);
        } else if headroom >= to_pay {
            ledger.record(claim, PaymentSource::Oop, false, to_pay);
        } else {
            ledger.record(claim, PaymentSource::Oop, false, headroom);
            ledger.record(claim, PaymentSource::OopMax, true, to_pay - headroom);
        }
    }
}
