use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde::de::IgnoredAny;
use tracing::debug;

use crate::categories::CategoryRegistry;
use crate::claim_generator::{ClaimGenerator, ClaimProbability};
use crate::distribution::{Distribution, parse_distribution};
use crate::error::{ConfigurationError, Error};
use crate::plan::{CoverageTerms, InsurancePlan};

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub seed: u64,
    pub trials: u64,
    /// Fan trials out over the rayon pool instead of the calling thread.
    pub parallel: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig { seed: 42, trials: 3000, parallel: true }
    }
}

/// Claim generators and plans to register with a simulator.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub generators: Vec<ClaimGenerator>,
    pub plans: Vec<InsurancePlan>,
}

/// Reference setup: an emergency generator and a primary-care generator,
/// compared under a low-deductible copay plan and a high-deductible
/// coinsurance plan.
pub fn canonical(registry: &CategoryRegistry) -> Result<Scenario, Error> {
    // ── Claim generators ──────────────────────────────────────────────────
    // Emergencies: ~0.3 per year, each an ER visit that is often followed
    // by an ambulance and a hospital stay.
    let mut emergency = ClaimGenerator::from_spec("Emergency", "poisson 0.3")?;
    emergency.add_rule(registry, "emergency_room_care", "1", "lognormal 4000 1000", "0")?;
    emergency.add_rule(registry, "emergency_medical_transportation", "coinflip 0.6", "500", "0")?;
    emergency.add_rule(registry, "inpatient_hospital", "coinflip 0.6", "lognormal 30000 10000", "0")?;

    let mut primary = ClaimGenerator::from_spec("Primary care", "poisson 1.5")?;
    primary.add_rule(registry, "primary_care_visit", "1", "lognormal 300 100", "0")?;

    // ── Plans ─────────────────────────────────────────────────────────────
    let mut copay = InsurancePlan::new("Low deductible", 10_000.0, 100.0, 3_000.0)?;
    copay.cover(registry, "emergency_room_care", CoverageTerms::copay(300.0))?;
    copay.cover(registry, "emergency_medical_transportation", CoverageTerms::copay(100.0))?;
    copay.cover(registry, "inpatient_hospital", CoverageTerms::copay(500.0))?;
    copay.cover(registry, "primary_care_visit", CoverageTerms::copay(50.0))?;

    let mut coinsurance = InsurancePlan::new("High deductible", 7_000.0, 2_000.0, 8_000.0)?;
    for category in [
        "emergency_room_care",
        "emergency_medical_transportation",
        "inpatient_hospital",
        "primary_care_visit",
    ] {
        coinsurance.cover(registry, category, CoverageTerms::coinsurance(0.2))?;
    }

    Ok(Scenario { generators: vec![emergency, primary], plans: vec![copay, coinsurance] })
}

// ── Plan table (CSV) ──────────────────────────────────────────────────────

pub struct PlanTableOptions {
    /// Premium rows are per pay period; multiplied by this to get the
    /// annual premium.
    pub pay_periods: f64,
}

impl Default for PlanTableOptions {
    fn default() -> Self {
        PlanTableOptions { pay_periods: 26.0 }
    }
}

const NAME: &str = "name";
const PREMIUM: &str = "premium";
const DEDUCTIBLE: &str = "deductible";
const OOP_MAX: &str = "oop_max";
const REWARDS: &str = "rewards";
const HSA_VALUE: &str = "hsa_value";
const NO_DEDUCTIBLES: &str = "no_deductibles";

const RESERVED_COLUMNS: [&str; 7] =
    [NAME, PREMIUM, DEDUCTIBLE, OOP_MAX, REWARDS, HSA_VALUE, NO_DEDUCTIBLES];

/// Load one plan per CSV row. Columns other than the reserved ones name
/// categories; each non-empty cell becomes that category's coverage.
pub fn load_plans(
    reader: impl Read,
    registry: &CategoryRegistry,
    options: &PlanTableOptions,
) -> Result<Vec<InsurancePlan>, Error> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    for required in [NAME, PREMIUM, DEDUCTIBLE, OOP_MAX] {
        if !headers.iter().any(|h| h == required) {
            return Err(ConfigurationError::MissingColumn(required).into());
        }
    }

    let mut plans = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let row: HashMap<&str, &str> =
            headers.iter().map(String::as_str).zip(record.iter().map(str::trim)).collect();
        let plan = plan_from_row(&headers, &row, registry, options)?;
        debug!(plan = plan.name(), premium = plan.premium(), "loaded plan");
        plans.push(plan);
    }
    Ok(plans)
}

pub fn load_plans_from_path(
    path: impl AsRef<Path>,
    registry: &CategoryRegistry,
    options: &PlanTableOptions,
) -> Result<Vec<InsurancePlan>, Error> {
    load_plans(File::open(path)?, registry, options)
}

fn plan_from_row(
    headers: &[String],
    row: &HashMap<&str, &str>,
    registry: &CategoryRegistry,
    options: &PlanTableOptions,
) -> Result<InsurancePlan, Error> {
    let name = row.get(NAME).copied().unwrap_or_default();
    let amount = |column: &str| -> Result<f64, ConfigurationError> {
        match row.get(column).copied().unwrap_or_default() {
            "" if !matches!(column, PREMIUM | DEDUCTIBLE | OOP_MAX) => Ok(0.0),
            value => value.parse().map_err(|_| ConfigurationError::InvalidPlanCell {
                plan: name.to_string(),
                column: column.to_string(),
                value: value.to_string(),
            }),
        }
    };

    let premium = amount(PREMIUM)? * options.pay_periods - amount(REWARDS)? - amount(HSA_VALUE)?;
    let mut plan = InsurancePlan::new(name, premium, amount(DEDUCTIBLE)?, amount(OOP_MAX)?)?;

    let no_deductibles: Vec<&str> =
        row.get(NO_DEDUCTIBLES).copied().unwrap_or_default().split_whitespace().collect();
    for category in &no_deductibles {
        registry.category(category)?;
    }

    for column in headers.iter().filter(|h| !RESERVED_COLUMNS.contains(&h.as_str())) {
        let value = row.get(column.as_str()).copied().unwrap_or_default();
        let Some(mut terms) = parse_coverage_cell(value).ok_or_else(|| {
            ConfigurationError::InvalidPlanCell {
                plan: name.to_string(),
                column: column.clone(),
                value: value.to_string(),
            }
        })?
        else {
            continue;
        };
        if terms.covered && no_deductibles.contains(&column.as_str()) {
            terms = terms.without_deductible();
        }
        plan.cover(registry, column, terms)?;
    }

    Ok(plan)
}

/// `None` for a malformed cell, `Some(None)` for an empty one.
fn parse_coverage_cell(value: &str) -> Option<Option<CoverageTerms>> {
    if value.is_empty() {
        return Some(None);
    }
    if value == "uncovered" {
        return Some(Some(CoverageTerms::uncovered()));
    }
    if !value.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let number: f64 = value.parse().ok()?;
    if number < 1.0 {
        Some(Some(CoverageTerms::coinsurance(number)))
    } else {
        Some(Some(CoverageTerms::copay(number.trunc())))
    }
}

// ── Claim generators (JSON or YAML) ───────────────────────────────────────

/// A distribution as written in a definition file: specification text or a
/// bare number. Parsed after loading so parse errors keep their class.
#[derive(Deserialize)]
#[serde(untagged)]
enum SpecValue {
    Text(String),
    Number(f64),
}

impl SpecValue {
    fn parse(&self) -> Result<Distribution, Error> {
        match self {
            SpecValue::Text(text) => parse_distribution(text),
            SpecValue::Number(value) => Ok(Distribution::fixed(*value)?),
        }
    }
}

#[derive(Deserialize)]
struct GeneratorEntry {
    probability: SpecValue,
    #[serde(flatten)]
    rules: BTreeMap<String, RuleSlot>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleSlot {
    Rule(RuleEntry),
    Malformed(IgnoredAny),
}

#[derive(Deserialize)]
struct RuleEntry {
    probability: SpecValue,
    oop: SpecValue,
    discount: SpecValue,
}

/// Load claim generators from a JSON object keyed by generator name.
/// Generators are returned in name order.
pub fn load_claim_generators(
    reader: impl Read,
    registry: &CategoryRegistry,
) -> Result<Vec<ClaimGenerator>, Error> {
    let entries: BTreeMap<String, GeneratorEntry> = serde_json::from_reader(reader)?;
    build_generators(entries, registry)
}

/// As `load_claim_generators`, for a YAML mapping of the same shape.
pub fn load_claim_generators_yaml(
    mut reader: impl Read,
    registry: &CategoryRegistry,
) -> Result<Vec<ClaimGenerator>, Error> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let entries: BTreeMap<String, GeneratorEntry> = serde_saphyr::from_str(&text)?;
    build_generators(entries, registry)
}

/// Reads YAML for `.yaml`/`.yml` files and JSON otherwise.
pub fn load_claim_generators_from_path(
    path: impl AsRef<Path>,
    registry: &CategoryRegistry,
) -> Result<Vec<ClaimGenerator>, Error> {
    let path = path.as_ref();
    let file = File::open(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => load_claim_generators_yaml(file, registry),
        _ => load_claim_generators(file, registry),
    }
}

fn build_generators(
    entries: BTreeMap<String, GeneratorEntry>,
    registry: &CategoryRegistry,
) -> Result<Vec<ClaimGenerator>, Error> {
    let mut generators = Vec::with_capacity(entries.len());
    for (name, entry) in entries {
        let mut generator = ClaimGenerator::new(name.as_str(), entry.probability.parse()?);
        for (key, slot) in entry.rules {
            let RuleSlot::Rule(rule) = slot else {
                return Err(ConfigurationError::InvalidGeneratorEntry { generator: name, key }.into());
            };
            generator.add_probability(ClaimProbability {
                category: registry.category(&key)?,
                frequency: rule.probability.parse()?,
                charge: rule.oop.parse()?,
                discount: rule.discount.parse()?,
            });
        }
        debug!(generator = %name, rules = generator.rules().len(), "loaded claim generator");
        generators.push(generator);
    }
    Ok(generators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainError, ValidationError};
    use crate::plan::CostShare;

    fn registry() -> CategoryRegistry {
        CategoryRegistry::healthcare_gov()
    }

    const PLANS: &str = "\
name,premium,deductible,oop_max,rewards,hsa_value,no_deductibles,primary_care_visit,imaging,dental_b,urgent_care
Standard,100,1500,6000,0,0,,30,0.2,uncovered,75
HDHP,50,3000,7000,100,600,primary_care_visit urgent_care,0.1,0.3,,50
";

    fn load(text: &str) -> Result<Vec<InsurancePlan>, Error> {
        load_plans(text.as_bytes(), &registry(), &PlanTableOptions::default())
    }

    #[test]
    fn canonical_scenario_builds() {
        let scenario = canonical(&registry()).unwrap();
        assert_eq!(scenario.generators.len(), 2);
        assert_eq!(scenario.plans.len(), 2);
        for generator in &scenario.generators {
            for category in generator.possible_categories() {
                for plan in &scenario.plans {
                    assert!(plan.coverage(&category).is_some(), "{} lacks {category}", plan.name());
                }
            }
        }
    }

    #[test]
    fn plan_rows_become_plans() {
        let plans = load(PLANS).unwrap();
        assert_eq!(plans.len(), 2);

        let standard = &plans[0];
        assert_eq!(standard.name(), "Standard");
        assert_eq!(standard.premium(), 2600.0);
        assert_eq!(standard.deductible(), 1500.0);
        assert_eq!(standard.oop_max(), 6000.0);

        let reg = registry();
        let cov = |plan: &InsurancePlan, cat: &str| plan.coverage(&reg.category(cat).unwrap()).cloned();
        assert_eq!(cov(standard, "primary_care_visit").unwrap().cost_share(), Some(CostShare::Copay(30.0)));
        assert_eq!(cov(standard, "imaging").unwrap().cost_share(), Some(CostShare::Coinsurance(0.2)));
        assert!(!cov(standard, "dental_b").unwrap().is_covered());
        assert!(!cov(standard, "urgent_care").unwrap().no_deductible());
    }

    #[test]
    fn premium_subtracts_rewards_and_hsa() {
        let plans = load(PLANS).unwrap();
        assert_eq!(plans[1].premium(), 50.0 * 26.0 - 100.0 - 600.0);
    }

    #[test]
    fn no_deductibles_and_empty_cells() {
        let reg = registry();
        let hdhp = &load(PLANS).unwrap()[1];
        let primary = hdhp.coverage(&reg.category("primary_care_visit").unwrap()).unwrap();
        assert!(primary.no_deductible());
        let imaging = hdhp.coverage(&reg.category("imaging").unwrap()).unwrap();
        assert!(!imaging.no_deductible());
        assert!(hdhp.coverage(&reg.category("dental_b").unwrap()).is_none());
    }

    #[test]
    fn copay_cells_keep_integer_part() {
        let text = "name,premium,deductible,oop_max,imaging\nP,10,0,100,45.75\n";
        let plan = &load(text).unwrap()[0];
        let cov = plan.coverage(&registry().category("imaging").unwrap()).unwrap();
        assert_eq!(cov.copay(), Some(45.0));
    }

    #[test]
    fn pay_periods_are_configurable() {
        let text = "name,premium,deductible,oop_max\nMonthly,400,0,1000\n";
        let opts = PlanTableOptions { pay_periods: 12.0 };
        let plans = load_plans(text.as_bytes(), &registry(), &opts).unwrap();
        assert_eq!(plans[0].premium(), 4800.0);
    }

    #[test]
    fn malformed_cell_is_rejected() {
        let text = "name,premium,deductible,oop_max,imaging\nP,10,0,100,20%\n";
        let err = load(text).unwrap_err();
        assert!(
            matches!(err, Error::Configuration(ConfigurationError::InvalidPlanCell { ref value, .. }) if value == "20%"),
            "got {err:?}"
        );
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let text = "name,premium,deductible,imaging\nP,10,0,0.2\n";
        assert!(matches!(
            load(text).unwrap_err(),
            Error::Configuration(ConfigurationError::MissingColumn("oop_max"))
        ));
    }

    #[test]
    fn unknown_category_column_is_rejected() {
        let text = "name,premium,deductible,oop_max,acupuncture\nP,10,0,100,20\n";
        assert!(matches!(
            load(text).unwrap_err(),
            Error::Validation(ValidationError::UnknownCategory(_))
        ));
    }

    const GENERATORS: &str = r#"{
        "Routine": {
            "probability": 2,
            "primary_care_visit": { "probability": "1", "oop": "uniform 150 250", "discount": 0.2 }
        },
        "Accident": {
            "probability": "poisson 0.1",
            "emergency_room_care": { "probability": 1, "oop": "lognormal 3000 800", "discount": "0" },
            "imaging": { "probability": "coinflip 0.5", "oop": 1200, "discount": "0.1" }
        }
    }"#;

    #[test]
    fn generators_load_in_name_order() {
        let generators = load_claim_generators(GENERATORS.as_bytes(), &registry()).unwrap();
        let names: Vec<&str> = generators.iter().map(ClaimGenerator::name).collect();
        assert_eq!(names, ["Accident", "Routine"]);

        let accident = &generators[0];
        assert_eq!(accident.frequency(), &Distribution::Poisson { lambda: 0.1 });
        assert_eq!(accident.rules().len(), 2);
        let imaging = accident.rules().iter().find(|r| r.category.as_str() == "imaging").unwrap();
        assert_eq!(imaging.frequency, Distribution::Coinflip { p: 0.5 });
        assert_eq!(imaging.charge, Distribution::Fixed(1200.0));

        let routine = &generators[1];
        assert_eq!(routine.frequency(), &Distribution::Fixed(2.0));
        assert_eq!(routine.rules()[0].discount, Distribution::Fixed(0.2));
    }

    #[test]
    fn generator_entry_must_be_a_rule() {
        let text = r#"{ "G": { "probability": 1, "imaging": "often" } }"#;
        assert!(matches!(
            load_claim_generators(text.as_bytes(), &registry()).unwrap_err(),
            Error::Configuration(ConfigurationError::InvalidGeneratorEntry { .. })
        ));
    }

    #[test]
    fn generator_with_unknown_category_is_rejected() {
        let text = r#"{ "G": { "probability": 1, "telepathy": { "probability": 1, "oop": 5, "discount": 0 } } }"#;
        assert!(matches!(
            load_claim_generators(text.as_bytes(), &registry()).unwrap_err(),
            Error::Validation(ValidationError::UnknownCategory(_))
        ));
    }

    #[test]
    fn unknown_baseline_distribution_keeps_its_error_class() {
        let text = r#"{ "G": { "probability": "zipf 2" } }"#;
        let err = load_claim_generators(text.as_bytes(), &registry()).unwrap_err();
        assert!(
            matches!(err, Error::Configuration(ConfigurationError::UnknownDistribution(ref n)) if n == "zipf"),
            "got {err:?}"
        );
    }

    #[test]
    fn out_of_domain_rule_parameter_is_a_domain_error() {
        let text = r#"{ "G": { "probability": 1, "imaging": { "probability": "coinflip 2", "oop": 100, "discount": 0 } } }"#;
        let err = load_claim_generators(text.as_bytes(), &registry()).unwrap_err();
        assert!(matches!(err, Error::Domain(DomainError::InvalidParameter { name: "coinflip", .. })), "got {err:?}");
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let text = r#"{ "G": { "probability": 1, "#;
        assert!(matches!(load_claim_generators(text.as_bytes(), &registry()).unwrap_err(), Error::Json(_)));
    }

    const GENERATORS_YAML: &str = "\
Accident:
  probability: poisson 0.1
  emergency_room_care:
    probability: 1
    oop: lognormal 3000 800
    discount: 0
  imaging:
    probability: coinflip 0.5
    oop: 1200
    discount: '0.1'
Routine:
  probability: 2
  primary_care_visit:
    probability: '1'
    oop: uniform 150 250
    discount: 0.2
";

    #[test]
    fn yaml_definitions_match_json() {
        let reg = registry();
        let from_yaml = load_claim_generators_yaml(GENERATORS_YAML.as_bytes(), &reg).unwrap();
        let from_json = load_claim_generators(GENERATORS.as_bytes(), &reg).unwrap();
        assert_eq!(from_yaml.len(), from_json.len());
        for (y, j) in from_yaml.iter().zip(&from_json) {
            assert_eq!(y.name(), j.name());
            assert_eq!(y.frequency(), j.frequency());
            assert_eq!(y.rules(), j.rules());
        }
    }

    #[test]
    fn yaml_parse_errors_keep_their_class() {
        let text = "G:\n  probability: 1\n  imaging:\n    probability: binomial 0 0.5\n    oop: 5\n    discount: 0\n";
        let err = load_claim_generators_yaml(text.as_bytes(), &registry()).unwrap_err();
        assert!(matches!(err, Error::Domain(DomainError::InvalidParameter { name: "binomial", .. })), "got {err:?}");
        let text = "G:\n  probability: 1\n  imaging: often\n";
        assert!(matches!(
            load_claim_generators_yaml(text.as_bytes(), &registry()).unwrap_err(),
            Error::Configuration(ConfigurationError::InvalidGeneratorEntry { .. })
        ));
    }
}
