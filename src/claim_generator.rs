use std::collections::BTreeSet;
use std::sync::Arc;

use rand::Rng;

use crate::categories::{Category, CategoryRegistry};
use crate::claim::Claim;
use crate::distribution::{Distribution, parse_distribution};
use crate::error::{DomainError, Error};

/// The conditional probability of one kind of claim, given a baseline event.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimProbability {
    pub category: Category,
    /// Claims of this category per baseline event.
    pub frequency: Distribution,
    /// Billed charge per claim.
    pub charge: Distribution,
    /// Provider discount per claim, in `[0, 1]`.
    pub discount: Distribution,
}

/// Produces a stochastic set of claims for one simulated year.
///
/// A baseline distribution decides how many events happen; each event then
/// rolls every registered `ClaimProbability` to decide which claims follow.
#[derive(Debug, Clone)]
pub struct ClaimGenerator {
    name: Arc<str>,
    frequency: Distribution,
    rules: Vec<ClaimProbability>,
}

impl ClaimGenerator {
    pub fn new(name: impl Into<Arc<str>>, frequency: Distribution) -> Self {
        ClaimGenerator { name: name.into(), frequency, rules: Vec::new() }
    }

    pub fn from_spec(name: impl Into<Arc<str>>, frequency: &str) -> Result<Self, Error> {
        Ok(Self::new(name, parse_distribution(frequency)?))
    }

    /// Register one conditional claim type from distribution specifications.
    pub fn add_rule(
        &mut self,
        registry: &CategoryRegistry,
        category: &str,
        frequency: &str,
        charge: &str,
        discount: &str,
    ) -> Result<(), Error> {
        let rule = ClaimProbability {
            category: registry.category(category)?,
            frequency: parse_distribution(frequency)?,
            charge: parse_distribution(charge)?,
            discount: parse_distribution(discount)?,
        };
        self.add_probability(rule);
        Ok(())
    }

    pub fn add_probability(&mut self, rule: ClaimProbability) {
        self.rules.push(rule);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frequency(&self) -> &Distribution {
        &self.frequency
    }

    pub fn rules(&self) -> &[ClaimProbability] {
        &self.rules
    }

    /// Every category this generator can emit.
    pub fn possible_categories(&self) -> BTreeSet<Category> {
        self.rules.iter().map(|r| r.category.clone()).collect()
    }

    /// Generate one year's claims, in generation order.
    pub fn generate(&self, rng: &mut impl Rng) -> Result<Vec<Claim>, DomainError> {
        let mut claims = Vec::new();
        let events = draw_count(&self.frequency, rng, &self.name)?;

        for _ in 0..events {
            for rule in &self.rules {
                let k = draw_count(&rule.frequency, rng, rule.category.as_str())?;
                for _ in 0..k {
                    claims.push(self.draw_claim(rule, rng)?);
                }
            }
        }

        Ok(claims)
    }

    fn draw_claim(&self, rule: &ClaimProbability, rng: &mut impl Rng) -> Result<Claim, DomainError> {
        let oop_amount = rule.charge.sample(rng);
        if !(oop_amount >= 0.0 && oop_amount.is_finite()) {
            return Err(DomainError::InvalidCharge {
                category: rule.category.to_string(),
                value: oop_amount,
            });
        }

        // One draw per claim: the checked value is the applied value.
        let discount = rule.discount.sample(rng);
        if !(0.0..=1.0).contains(&discount) {
            return Err(DomainError::DiscountOutOfRange {
                category: rule.category.to_string(),
                value: discount,
            });
        }

        Ok(Claim {
            name: Arc::clone(&self.name),
            category: rule.category.clone(),
            oop_amount,
            negotiated_amount: oop_amount * (1.0 - discount),
        })
    }
}

/// Draw an event count, rounding continuous samples to the nearest integer.
fn draw_count(dist: &Distribution, rng: &mut impl Rng, source: &str) -> Result<u64, DomainError> {
    let value = dist.sample(rng);
    let rounded = value.round();
    if !(rounded >= 0.0 && rounded.is_finite()) {
        return Err(DomainError::InvalidCount { source_name: source.to_string(), value });
    }
    Ok(rounded as u64)
}
