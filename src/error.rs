use thiserror::Error;

/// Malformed or incomplete setup. Raised before any trial runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("empty distribution specification")]
    EmptyDistribution,

    #[error("unknown distribution `{0}`")]
    UnknownDistribution(String),

    #[error("distribution `{name}` takes {expected} argument(s), got {got}")]
    WrongArity { name: &'static str, expected: usize, got: usize },

    #[error("distribution `{name}`: argument `{arg}` is not a number")]
    MalformedArgument { name: &'static str, arg: String },

    #[error("plan `{plan}` already has coverage for `{category}`")]
    DuplicateCoverage { plan: String, category: String },

    #[error("plan `{plan}` has no coverage for `{category}`")]
    MissingCoverage { plan: String, category: String },

    #[error("simulator must be validated before running trials")]
    NotValidated,

    #[error("plan table is missing column `{0}`")]
    MissingColumn(&'static str),

    #[error("plan `{plan}`: invalid value `{value}` for `{column}`")]
    InvalidPlanCell { plan: String, column: String, value: String },

    #[error("claim generator `{generator}`: entry `{key}` is not a category rule")]
    InvalidGeneratorEntry { generator: String, key: String },
}

/// A value failed a domain constraint at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid category `{0}`")]
    UnknownCategory(String),

    #[error("coverage for `{0}` sets both coinsurance and copay")]
    CoinsuranceAndCopay(String),

    #[error("coverage for `{0}` sets neither coinsurance nor copay")]
    MissingCostShare(String),

    #[error("coverage for `{0}` is uncovered but sets cost-share terms")]
    TermsOnUncovered(String),

    #[error("coverage for `{category}`: coinsurance {value} outside [0, 1]")]
    CoinsuranceOutOfRange { category: String, value: f64 },

    #[error("coverage for `{category}`: negative copay {value}")]
    NegativeCopay { category: String, value: f64 },

    #[error("{field} must be a non-negative finite amount, got {value}")]
    InvalidAmount { field: &'static str, value: f64 },

    #[error("plan `{plan}`: deductible {deductible} exceeds out-of-pocket maximum {oop_max}")]
    DeductibleAboveOopMax { plan: String, deductible: f64, oop_max: f64 },

    #[error("payment amount must be positive, got {0}")]
    NonPositivePayment(f64),

    #[error("a premium payment cannot be insurer-covered")]
    CoveredPremium,

    #[error("only premium payments may omit their claim")]
    MissingClaim,
}

/// A sampled or supplied number fell outside the range its use requires.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("distribution `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: &'static str },

    #[error("`{category}` discount {value} outside [0, 1]")]
    DiscountOutOfRange { category: String, value: f64 },

    #[error("`{category}` charge {value} is not a non-negative amount")]
    InvalidCharge { category: String, value: f64 },

    #[error("`{source_name}` produced event count {value}")]
    InvalidCount { source_name: String, value: f64 },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("plan table: {0}")]
    Csv(#[from] csv::Error),

    #[error("claim generator definitions: {0}")]
    Json(#[from] serde_json::Error),

    #[error("claim generator definitions: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
