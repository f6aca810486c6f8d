use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::analysis::{self, PlanSummary};
use crate::claim::Claim;
use crate::claim_generator::ClaimGenerator;
use crate::config::{Scenario, SimulationConfig};
use crate::error::{ConfigurationError, DomainError, Error};
use crate::payment::Payment;
use crate::plan::InsurancePlan;
use crate::types::{GeneratorId, PlanId, TrialId};

/// Reduces one year's claims to a scalar.
pub type ClaimsCallback = Box<dyn Fn(&[Claim]) -> f64 + Send + Sync>;
/// Reduces one plan's year of payments to a scalar.
pub type PaymentsCallback = Box<dyn Fn(&[Payment]) -> f64 + Send + Sync>;

/// Default claims statistic: total billed (undiscounted) charges.
pub fn total_billed(claims: &[Claim]) -> f64 {
    claims.iter().map(|c| c.oop_amount).sum()
}

/// Default payments statistic: everything the insured paid, premium included.
pub fn out_of_pocket(payments: &[Payment]) -> f64 {
    payments.iter().filter(|p| p.is_individual()).map(|p| p.amount).sum()
}

/// One trial's claims and every plan's ledger, for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct YearRecord {
    pub trial: TrialId,
    pub claims: Vec<Claim>,
    /// Indexed by `PlanId`.
    pub payments: Vec<Vec<Payment>>,
}

struct TrialOutcome {
    claims_stat: f64,
    plan_stats: Vec<f64>,
}

/// Runs repeated simulated years: every trial merges the claim generators'
/// output into one shuffled claim stream and replays it against every plan.
///
/// Trial `t` draws from ChaCha20 stream `t` of the simulator's seed, so a
/// serial run, a parallel run and `replay_year` all see the same years.
pub struct YearSimulator {
    seed: u64,
    claim_generators: Vec<ClaimGenerator>,
    plans: Vec<InsurancePlan>,
    /// Per-plan series of payments-callback results, indexed by `PlanId`.
    results: Vec<Vec<f64>>,
    claim_results: Vec<f64>,
    claims_callback: ClaimsCallback,
    payments_callback: PaymentsCallback,
    validated: bool,
    next_trial: TrialId,
}

impl YearSimulator {
    pub fn new(seed: u64) -> Self {
        YearSimulator {
            seed,
            claim_generators: Vec::new(),
            plans: Vec::new(),
            results: Vec::new(),
            claim_results: Vec::new(),
            claims_callback: Box::new(total_billed),
            payments_callback: Box::new(out_of_pocket),
            validated: false,
            next_trial: TrialId(0),
        }
    }

    /// Construct and register every collaborator of `scenario`.
    pub fn from_config(config: &SimulationConfig, scenario: Scenario) -> Self {
        let mut sim = Self::new(config.seed);
        for generator in scenario.generators {
            sim.add_claim_generator(generator);
        }
        for plan in scenario.plans {
            sim.add_insurance_plan(plan);
        }
        sim
    }

    pub fn add_claim_generator(&mut self, generator: ClaimGenerator) -> GeneratorId {
        self.validated = false;
        self.claim_generators.push(generator);
        GeneratorId(self.claim_generators.len() - 1)
    }

    pub fn add_insurance_plan(&mut self, plan: InsurancePlan) -> PlanId {
        self.validated = false;
        self.plans.push(plan);
        self.results.push(Vec::new());
        PlanId(self.plans.len() - 1)
    }

    pub fn set_claims_callback(&mut self, callback: impl Fn(&[Claim]) -> f64 + Send + Sync + 'static) {
        self.claims_callback = Box::new(callback);
    }

    pub fn set_payments_callback(
        &mut self,
        callback: impl Fn(&[Payment]) -> f64 + Send + Sync + 'static,
    ) {
        self.payments_callback = Box::new(callback);
    }

    pub fn default_callbacks(&mut self) {
        self.claims_callback = Box::new(total_billed);
        self.payments_callback = Box::new(out_of_pocket);
    }

    /// Check that every plan covers every category any generator can emit.
    pub fn validate(&mut self) -> Result<(), ConfigurationError> {
        for generator in &self.claim_generators {
            for category in generator.possible_categories() {
                if let Some(plan) = self.plans.iter().find(|p| p.coverage(&category).is_none()) {
                    return Err(ConfigurationError::MissingCoverage {
                        plan: plan.name().to_string(),
                        category: category.to_string(),
                    });
                }
            }
        }
        self.validated = true;
        info!(
            generators = self.claim_generators.len(),
            plans = self.plans.len(),
            "simulator validated"
        );
        Ok(())
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    fn trial_rng(&self, trial: TrialId) -> ChaCha20Rng {
        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
        rng.set_stream(trial.0);
        rng
    }

    /// Run every generator, concatenate their claims and shuffle the result.
    pub fn simulate_claims(&self, rng: &mut ChaCha20Rng) -> Result<Vec<Claim>, DomainError> {
        let mut claims = Vec::new();
        for generator in &self.claim_generators {
            claims.extend(generator.generate(rng)?);
        }
        claims.shuffle(rng);
        Ok(claims)
    }

    /// Regenerate one trial's claims and every plan's full ledger.
    pub fn replay_year(&self, trial: TrialId) -> Result<YearRecord, Error> {
        self.ensure_validated()?;
        let mut rng = self.trial_rng(trial);
        let claims = self.simulate_claims(&mut rng)?;
        let payments = self
            .plans
            .iter()
            .map(|plan| plan.pay_year(&claims))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(YearRecord { trial, claims, payments })
    }

    fn run_trial(&self, trial: TrialId) -> Result<TrialOutcome, Error> {
        let mut rng = self.trial_rng(trial);
        let claims = self.simulate_claims(&mut rng)?;
        let claims_stat = (self.claims_callback)(&claims);

        let mut plan_stats = Vec::with_capacity(self.plans.len());
        for plan in &self.plans {
            let payments = plan.pay_year(&claims)?;
            plan_stats.push((self.payments_callback)(&payments));
        }

        debug!(trial = trial.0, claims = claims.len(), "trial complete");
        Ok(TrialOutcome { claims_stat, plan_stats })
    }

    fn merge(&mut self, outcome: TrialOutcome) {
        self.claim_results.push(outcome.claims_stat);
        for (series, stat) in self.results.iter_mut().zip(outcome.plan_stats) {
            series.push(stat);
        }
        self.next_trial = self.next_trial.next();
    }

    fn ensure_validated(&self) -> Result<(), ConfigurationError> {
        if self.validated { Ok(()) } else { Err(ConfigurationError::NotValidated) }
    }

    /// Simulate one year and record its statistics.
    pub fn simulate(&mut self) -> Result<(), Error> {
        self.ensure_validated()?;
        let outcome = self.run_trial(self.next_trial)?;
        self.merge(outcome);
        Ok(())
    }

    /// Simulate `trials` years in order on the calling thread. A failing
    /// trial stops the run; earlier trials keep their results.
    pub fn run(&mut self, trials: u64) -> Result<(), Error> {
        self.ensure_validated()?;
        let started = Instant::now();
        info!(trials, first = self.next_trial.0, "serial run started");
        for _ in 0..trials {
            self.simulate()?;
        }
        info!(trials, elapsed_ms = started.elapsed().as_millis() as u64, "serial run finished");
        Ok(())
    }

    /// Simulate `trials` years across the rayon pool. Results are merged in
    /// trial order, so the series match a serial run of the same trials.
    pub fn run_parallel(&mut self, trials: u64) -> Result<(), Error> {
        let never = AtomicBool::new(false);
        self.run_parallel_cancellable(trials, &never).map(|_| ())
    }

    /// As `run_parallel`, but no new trial starts once `cancel` is set.
    /// Only the unbroken prefix of completed trials is merged; returns how
    /// many were.
    pub fn run_parallel_cancellable(&mut self, trials: u64, cancel: &AtomicBool) -> Result<u64, Error> {
        self.ensure_validated()?;
        let started = Instant::now();
        let first = self.next_trial.0;
        info!(trials, first, "parallel run started");

        let outcomes: Vec<Option<Result<TrialOutcome, Error>>> = (first..first + trials)
            .into_par_iter()
            .map(|t| {
                if cancel.load(Ordering::Relaxed) {
                    None
                } else {
                    Some(self.run_trial(TrialId(t)))
                }
            })
            .collect();

        let mut merged = 0;
        for outcome in outcomes {
            match outcome {
                Some(Ok(outcome)) => {
                    self.merge(outcome);
                    merged += 1;
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        info!(
            merged,
            cancelled = merged < trials,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "parallel run finished"
        );
        Ok(merged)
    }

    /// Drop all accumulated results and restart from trial zero.
    pub fn reset_results(&mut self) {
        self.claim_results.clear();
        for series in &mut self.results {
            series.clear();
        }
        self.next_trial = TrialId(0);
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn trials_completed(&self) -> u64 {
        self.next_trial.0
    }

    pub fn claim_generators(&self) -> &[ClaimGenerator] {
        &self.claim_generators
    }

    pub fn plans(&self) -> &[InsurancePlan] {
        &self.plans
    }

    pub fn plan(&self, id: PlanId) -> Option<&InsurancePlan> {
        self.plans.get(id.0)
    }

    pub fn plan_results(&self, id: PlanId) -> &[f64] {
        self.results.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn claim_results(&self) -> &[f64] {
        &self.claim_results
    }

    pub fn each_insurance_plan(&self) -> impl Iterator<Item = (PlanId, &InsurancePlan, &[f64])> {
        self.plans
            .iter()
            .zip(&self.results)
            .enumerate()
            .map(|(i, (plan, series))| (PlanId(i), plan, series.as_slice()))
    }

    /// Summary statistics for every plan with at least one trial.
    pub fn summaries(&self) -> Vec<PlanSummary> {
        self.each_insurance_plan()
            .filter_map(|(id, plan, series)| {
                analysis::summarize(series).map(|out_of_pocket| PlanSummary {
                    plan_id: id,
                    plan: plan.name().to_string(),
                    premium: plan.premium(),
                    deductible: plan.deductible(),
                    oop_max: plan.oop_max(),
                    out_of_pocket,
                })
            })
            .collect()
    }
}
