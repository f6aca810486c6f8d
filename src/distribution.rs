//! Textual distribution specifications and their samplers.
//!
//! A specification is `<name> <arg> ...`, or a single bare number which is
//! shorthand for `fixed <number>`. Parsing produces a `Distribution` value;
//! sampling draws from a caller-supplied random source, so a `Distribution`
//! holds no mutable state and can be shared freely across threads.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand_distr::{Poisson as PoissonSampler, StandardNormal};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConfigurationError, DomainError, Error};

/// Largest λ sampled with Knuth's method; e^-λ stays a normal f64 below
/// about 708. Larger rates go to `rand_distr::Poisson`.
const KNUTH_MAX_LAMBDA: f64 = 700.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    /// Always the same value.
    Fixed(f64),
    /// Integer drawn uniformly from `[min, max)`.
    Uniform { min: i64, max: i64 },
    /// 1 with probability `p`, else 0.
    Coinflip { p: f64 },
    /// Box–Muller normal.
    Normal { mean: f64, sd: f64 },
    /// Successes in `n` Bernoulli(`p`) trials.
    Binomial { n: u64, p: f64 },
    /// Knuth's multiplicative Poisson for moderate λ.
    Poisson { lambda: f64 },
    /// Log-normal parameterised by its arithmetic mean and standard deviation.
    LogNormal { mean: f64, sd: f64 },
}

impl Distribution {
    pub fn fixed(value: f64) -> Result<Self, DomainError> {
        if !value.is_finite() {
            return Err(domain("fixed", "value must be finite"));
        }
        Ok(Distribution::Fixed(value))
    }

    pub fn uniform(min: i64, max: i64) -> Result<Self, DomainError> {
        if max.checked_sub(min).is_none_or(|range| range <= 1) {
            return Err(domain("uniform", "max - min must exceed 1"));
        }
        Ok(Distribution::Uniform { min, max })
    }

    pub fn coinflip(p: f64) -> Result<Self, DomainError> {
        check_probability("coinflip", p)?;
        Ok(Distribution::Coinflip { p })
    }

    pub fn normal(mean: f64, sd: f64) -> Result<Self, DomainError> {
        if !mean.is_finite() {
            return Err(domain("normal", "mean must be finite"));
        }
        if !(sd > 0.0 && sd.is_finite()) {
            return Err(domain("normal", "sd must be positive"));
        }
        Ok(Distribution::Normal { mean, sd })
    }

    pub fn binomial(n: u64, p: f64) -> Result<Self, DomainError> {
        if n < 1 {
            return Err(domain("binomial", "n must be at least 1"));
        }
        check_probability("binomial", p)?;
        Ok(Distribution::Binomial { n, p })
    }

    pub fn poisson(lambda: f64) -> Result<Self, DomainError> {
        if !(lambda > 0.0 && lambda.is_finite()) {
            return Err(domain("poisson", "lambda must be positive"));
        }
        if PoissonSampler::new(lambda).is_err() {
            return Err(domain("poisson", "lambda is too large to sample"));
        }
        Ok(Distribution::Poisson { lambda })
    }

    pub fn lognormal(mean: f64, sd: f64) -> Result<Self, DomainError> {
        if !(mean > 0.0 && mean.is_finite()) {
            return Err(domain("lognormal", "mean must be positive"));
        }
        if !(sd > 0.0 && sd.is_finite()) {
            return Err(domain("lognormal", "sd must be positive"));
        }
        Ok(Distribution::LogNormal { mean, sd })
    }

    /// Draw one value.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        match *self {
            Distribution::Fixed(value) => value,
            Distribution::Uniform { min, max } => rng.random_range(min..max) as f64,
            Distribution::Coinflip { p } => {
                if rng.random::<f64>() < p {
                    1.0
                } else {
                    0.0
                }
            }
            Distribution::Normal { mean, sd } => {
                let u: f64 = rng.random();
                let v: f64 = rng.random();
                let theta = 2.0 * PI * u;
                let rho = (-2.0 * (1.0 - v).ln()).sqrt();
                mean + sd * rho * theta.cos()
            }
            Distribution::Binomial { n, p } => {
                (0..n).filter(|_| rng.random::<f64>() < p).count() as f64
            }
            Distribution::Poisson { lambda } if lambda > KNUTH_MAX_LAMBDA => {
                match PoissonSampler::new(lambda) {
                    Ok(poisson) => rng.sample(poisson),
                    Err(_) => lambda,
                }
            }
            Distribution::Poisson { lambda } => {
                let limit = (-lambda).exp();
                let mut acc = 1.0;
                let mut k: u64 = 0;
                loop {
                    k += 1;
                    acc *= rng.random::<f64>();
                    if acc <= limit {
                        break;
                    }
                }
                (k - 1) as f64
            }
            Distribution::LogNormal { mean, sd } => {
                let sigma_sq = (1.0 + (sd / mean).powi(2)).ln();
                let mu = mean.ln() - sigma_sq / 2.0;
                let z: f64 = rng.sample(StandardNormal);
                (mu + sigma_sq.sqrt() * z).exp()
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Distribution::Fixed(_) => "fixed",
            Distribution::Uniform { .. } => "uniform",
            Distribution::Coinflip { .. } => "coinflip",
            Distribution::Normal { .. } => "normal",
            Distribution::Binomial { .. } => "binomial",
            Distribution::Poisson { .. } => "poisson",
            Distribution::LogNormal { .. } => "lognormal",
        }
    }
}

fn domain(name: &'static str, reason: &'static str) -> DomainError {
    DomainError::InvalidParameter { name, reason }
}

fn check_probability(name: &'static str, p: f64) -> Result<(), DomainError> {
    if p > 0.0 && p < 1.0 {
        Ok(())
    } else {
        Err(domain(name, "p must lie strictly between 0 and 1"))
    }
}

fn arity(name: &'static str, args: &[&str], expected: usize) -> Result<(), ConfigurationError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ConfigurationError::WrongArity { name, expected, got: args.len() })
    }
}

fn number(name: &'static str, arg: &str) -> Result<f64, ConfigurationError> {
    arg.parse::<f64>()
        .map_err(|_| ConfigurationError::MalformedArgument { name, arg: arg.to_string() })
}

/// Integers may be written `3` or `3.0`; `3.5` is malformed.
fn integer(name: &'static str, arg: &str) -> Result<i64, ConfigurationError> {
    if let Ok(v) = arg.parse::<i64>() {
        return Ok(v);
    }
    match arg.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
        _ => Err(ConfigurationError::MalformedArgument { name, arg: arg.to_string() }),
    }
}

impl FromStr for Distribution {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut words = text.split_whitespace();
        let first = words.next().ok_or(ConfigurationError::EmptyDistribution)?;
        let args: Vec<&str> = words.collect();

        if args.is_empty()
            && let Ok(value) = first.parse::<f64>()
        {
            return Ok(Distribution::fixed(value)?);
        }

        let dist = match first {
            "fixed" => {
                arity("fixed", &args, 1)?;
                Distribution::fixed(number("fixed", args[0])?)?
            }
            "uniform" => {
                arity("uniform", &args, 2)?;
                Distribution::uniform(integer("uniform", args[0])?, integer("uniform", args[1])?)?
            }
            "coinflip" => {
                arity("coinflip", &args, 1)?;
                Distribution::coinflip(number("coinflip", args[0])?)?
            }
            "normal" => {
                arity("normal", &args, 2)?;
                Distribution::normal(number("normal", args[0])?, number("normal", args[1])?)?
            }
            "binomial" => {
                arity("binomial", &args, 2)?;
                let n = integer("binomial", args[0])?;
                let n = u64::try_from(n)
                    .map_err(|_| domain("binomial", "n must be at least 1"))?;
                Distribution::binomial(n, number("binomial", args[1])?)?
            }
            "poisson" => {
                arity("poisson", &args, 1)?;
                Distribution::poisson(number("poisson", args[0])?)?
            }
            "lognormal" => {
                arity("lognormal", &args, 2)?;
                Distribution::lognormal(number("lognormal", args[0])?, number("lognormal", args[1])?)?
            }
            other => return Err(ConfigurationError::UnknownDistribution(other.to_string()).into()),
        };
        Ok(dist)
    }
}

/// Parse a distribution specification.
pub fn parse_distribution(text: &str) -> Result<Distribution, Error> {
    text.parse()
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Fixed(value) => write!(f, "{value}"),
            Distribution::Uniform { min, max } => write!(f, "uniform {min} {max}"),
            Distribution::Coinflip { p } => write!(f, "coinflip {p}"),
            Distribution::Normal { mean, sd } => write!(f, "normal {mean} {sd}"),
            Distribution::Binomial { n, p } => write!(f, "binomial {n} {p}"),
            Distribution::Poisson { lambda } => write!(f, "poisson {lambda}"),
            Distribution::LogNormal { mean, sd } => write!(f, "lognormal {mean} {sd}"),
        }
    }
}

impl Serialize for Distribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Distribution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Spec {
            Text(String),
            Number(f64),
        }

        match Spec::deserialize(deserializer)? {
            Spec::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Spec::Number(value) => Distribution::fixed(value).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(42)
    }

    fn mean_of(dist: &Distribution, n: usize) -> f64 {
        let mut rng = rng();
        (0..n).map(|_| dist.sample(&mut rng)).sum::<f64>() / n as f64
    }

    #[test]
    fn fixed_is_deterministic() {
        let dist = parse_distribution("fixed 5").unwrap();
        let mut rng = rng();
        for _ in 0..1_000 {
            assert_eq!(dist.sample(&mut rng), 5.0);
        }
    }

    #[test]
    fn bare_number_is_fixed() {
        assert_eq!(parse_distribution("500").unwrap(), Distribution::Fixed(500.0));
        assert_eq!(parse_distribution("0.25").unwrap(), Distribution::Fixed(0.25));
        assert_eq!(parse_distribution("  1  ").unwrap(), Distribution::Fixed(1.0));
    }

    #[test]
    fn unknown_name_is_a_configuration_error() {
        let err = parse_distribution("gamma 2 3").unwrap_err();
        assert!(
            matches!(err, Error::Configuration(ConfigurationError::UnknownDistribution(ref n)) if n == "gamma"),
            "got {err:?}"
        );
    }

    #[test]
    fn empty_and_blank_text_are_rejected() {
        for text in ["", "   ", "\t\n"] {
            let err = parse_distribution(text).unwrap_err();
            assert!(
                matches!(err, Error::Configuration(ConfigurationError::EmptyDistribution)),
                "{text:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn malformed_and_missing_arguments_are_configuration_errors() {
        assert!(matches!(
            parse_distribution("normal 4000").unwrap_err(),
            Error::Configuration(ConfigurationError::WrongArity { name: "normal", expected: 2, got: 1 })
        ));
        assert!(matches!(
            parse_distribution("poisson lots").unwrap_err(),
            Error::Configuration(ConfigurationError::MalformedArgument { name: "poisson", .. })
        ));
        assert!(matches!(
            parse_distribution("uniform 1.5 9").unwrap_err(),
            Error::Configuration(ConfigurationError::MalformedArgument { name: "uniform", .. })
        ));
    }

    #[test]
    fn out_of_domain_parameters_are_domain_errors() {
        for text in [
            "normal 100 0",
            "normal 100 -5",
            "coinflip 0",
            "coinflip 1",
            "coinflip 1.5",
            "binomial 0 0.5",
            "binomial -3 0.5",
            "binomial 10 1",
            "uniform 3 4",
            "uniform 5 2",
            "poisson 0",
            "poisson -1",
            "lognormal 0 10",
            "lognormal 100 0",
        ] {
            let err = parse_distribution(text).unwrap_err();
            assert!(matches!(err, Error::Domain(DomainError::InvalidParameter { .. })), "{text}: {err:?}");
        }
    }

    #[test]
    fn poisson_mean_matches_lambda() {
        let dist = parse_distribution("poisson 2.0").unwrap();
        let mean = mean_of(&dist, 100_000);
        assert!((mean - 2.0).abs() < 0.1, "poisson mean {mean:.4} not within 5% of 2.0");
    }

    #[test]
    fn large_poisson_rates_are_accepted() {
        for lambda in [650.0, 708.0, 5_000.0] {
            let dist = parse_distribution(&format!("poisson {lambda}")).unwrap();
            let mean = mean_of(&dist, 20_000);
            assert!((mean - lambda).abs() < lambda * 0.01, "poisson {lambda}: mean {mean:.2}");
            let mut rng = rng();
            assert_eq!(dist.sample(&mut rng).fract(), 0.0);
        }
    }

    #[test]
    fn poisson_samples_are_non_negative_integers() {
        let dist = Distribution::poisson(0.3).unwrap();
        let mut rng = rng();
        for _ in 0..10_000 {
            let k = dist.sample(&mut rng);
            assert!(k >= 0.0 && k.fract() == 0.0, "bad poisson draw {k}");
        }
    }

    #[test]
    fn coinflip_returns_zero_or_one_with_rate_p() {
        let dist = parse_distribution("coinflip 0.6").unwrap();
        let mut rng = rng();
        let n = 50_000;
        let mut ones = 0;
        for _ in 0..n {
            let x = dist.sample(&mut rng);
            assert!(x == 0.0 || x == 1.0);
            if x == 1.0 {
                ones += 1;
            }
        }
        let rate = ones as f64 / n as f64;
        assert!((rate - 0.6).abs() < 0.01, "coinflip rate {rate:.4}");
    }

    #[test]
    fn binomial_mean_is_np() {
        let dist = parse_distribution("binomial 10 0.3").unwrap();
        let mean = mean_of(&dist, 50_000);
        assert!((mean - 3.0).abs() < 0.05, "binomial mean {mean:.4}");
    }

    #[test]
    fn normal_moments_match_parameters() {
        let dist = parse_distribution("normal 4000 1000").unwrap();
        let mut rng = rng();
        let n = 100_000;
        let xs: Vec<f64> = (0..n).map(|_| dist.sample(&mut rng)).collect();
        let mean = xs.iter().sum::<f64>() / n as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        assert!((mean - 4000.0).abs() < 20.0, "normal mean {mean:.1}");
        assert!((var.sqrt() - 1000.0).abs() < 20.0, "normal sd {:.1}", var.sqrt());
    }

    #[test]
    fn lognormal_mean_matches_parameter_and_stays_positive() {
        let dist = parse_distribution("lognormal 300 100").unwrap();
        let mut rng = rng();
        let n = 100_000;
        let xs: Vec<f64> = (0..n).map(|_| dist.sample(&mut rng)).collect();
        assert!(xs.iter().all(|&x| x > 0.0));
        let mean = xs.iter().sum::<f64>() / n as f64;
        assert!((mean - 300.0).abs() < 3.0, "lognormal mean {mean:.2}");
    }

    #[test]
    fn display_is_a_parseable_specification() {
        let parsed = parse_distribution("normal   30000\t10000").unwrap();
        assert_eq!(parsed.to_string(), "normal 30000 10000");
        assert_eq!(parse_distribution(&parsed.to_string()).unwrap(), parsed);
        assert_eq!(Distribution::Fixed(5.0).to_string(), "5");
    }

    #[test]
    fn deserializes_from_text_or_bare_number() {
        let dists: Vec<Distribution> =
            serde_json::from_str(r#"["poisson 0.1", 1, 0.25, "coinflip 0.6"]"#).unwrap();
        assert_eq!(
            dists,
            vec![
                Distribution::Poisson { lambda: 0.1 },
                Distribution::Fixed(1.0),
                Distribution::Fixed(0.25),
                Distribution::Coinflip { p: 0.6 },
            ]
        );
        assert!(serde_json::from_str::<Distribution>(r#""weibull 1 2""#).is_err());
        assert_eq!(serde_json::to_string(&Distribution::Poisson { lambda: 1.5 }).unwrap(), r#""poisson 1.5""#);
    }

    proptest! {
        #[test]
        fn uniform_stays_in_half_open_range(min in -1_000i64..1_000, width in 2i64..500, seed in any::<u64>()) {
            let dist = Distribution::uniform(min, min + width).unwrap();
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            for _ in 0..200 {
                let x = dist.sample(&mut rng);
                prop_assert!(x >= min as f64 && x < (min + width) as f64);
                prop_assert_eq!(x.fract(), 0.0);
            }
        }

        #[test]
        fn binomial_never_exceeds_n(n in 1u64..60, p in 0.01f64..0.99, seed in any::<u64>()) {
            let dist = Distribution::binomial(n, p).unwrap();
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            for _ in 0..100 {
                let x = dist.sample(&mut rng);
                prop_assert!(x >= 0.0 && x <= n as f64);
            }
        }
    }
}
