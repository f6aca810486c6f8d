use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{WrapErr, eyre};

use hins::analysis::PlanSummary;
use hins::categories::CategoryRegistry;
use hins::config::{self, PlanTableOptions, Scenario, SimulationConfig};
use hins::init_logging;
use hins::simulation::{YearRecord, YearSimulator};
use hins::types::TrialId;

#[derive(Parser, Debug)]
#[command(name = "hins")]
#[command(about = "Compare health insurance plans by simulated annual out-of-pocket cost")]
struct Args {
    /// Plan table (CSV). Defaults to the built-in reference plans.
    #[arg(long)]
    plans: Option<PathBuf>,

    /// Claim generator definitions (JSON, or YAML by extension). Defaults to the built-in generators.
    #[arg(long)]
    generators: Option<PathBuf>,

    /// Number of simulated years
    #[arg(short, long, default_value_t = 3000)]
    trials: u64,

    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Run trials on the calling thread instead of the rayon pool
    #[arg(long)]
    serial: bool,

    /// Pay periods per year when annualising plan-table premiums
    #[arg(long, default_value_t = 26.0)]
    pay_periods: f64,

    /// Print the claims and payments of one trial after the run
    #[arg(long, value_name = "TRIAL")]
    show_year: Option<u64>,

    /// Emit plan summaries as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let registry = CategoryRegistry::healthcare_gov();
    let scenario = load_scenario(&args, &registry)?;
    let config = SimulationConfig { seed: args.seed, trials: args.trials, parallel: !args.serial };

    let mut sim = YearSimulator::from_config(&config, scenario);
    sim.validate()?;
    if config.parallel {
        sim.run_parallel(config.trials)?;
    } else {
        sim.run(config.trials)?;
    }

    let summaries = sim.summaries();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print_summaries(&summaries, config.trials);
    }

    if let Some(trial) = args.show_year {
        if trial >= sim.trials_completed() {
            return Err(eyre!("--show-year {trial}: only {} trials were run", sim.trials_completed()));
        }
        print_year(&sim, &sim.replay_year(TrialId(trial))?);
    }

    Ok(())
}

fn load_scenario(args: &Args, registry: &CategoryRegistry) -> color_eyre::Result<Scenario> {
    let mut scenario = if args.plans.is_none() || args.generators.is_none() {
        config::canonical(registry)?
    } else {
        Scenario::default()
    };

    if let Some(path) = &args.plans {
        let options = PlanTableOptions { pay_periods: args.pay_periods };
        scenario.plans = config::load_plans_from_path(path, registry, &options)
            .wrap_err_with(|| format!("loading plans from {}", path.display()))?;
    }
    if let Some(path) = &args.generators {
        scenario.generators = config::load_claim_generators_from_path(path, registry)
            .wrap_err_with(|| format!("loading claim generators from {}", path.display()))?;
    }
    Ok(scenario)
}

fn print_summaries(summaries: &[PlanSummary], trials: u64) {
    println!("\n=== Annual cost, premium included ({trials} trials) ===");
    println!(
        "{:>20}: {:>9} ({:>9}, {:>9})  {:>9}  {:>9}  {:>9}",
        "Plan", "Mean", "2.5%", "97.5%", "SD", "Min", "Max"
    );
    println!("{}", "-".repeat(20 + 2 + 9 + 2 + 9 + 2 + 9 + 1 + 2 + 9 + 2 + 9 + 2 + 9));
    for s in summaries {
        let oop = &s.out_of_pocket;
        println!(
            "{:>20}: ${:8.2} (${:8.2}, ${:8.2})  {:>9.2}  {:>9.2}  {:>9.2}",
            s.plan, oop.mean, oop.ci_low, oop.ci_high, oop.std_dev, oop.min, oop.max
        );
    }
}

fn print_year(sim: &YearSimulator, year: &YearRecord) {
    println!("\n=== Trial {} ===", year.trial.0);
    if year.claims.is_empty() {
        println!("  No claims");
    }
    for claim in &year.claims {
        println!("  {claim}");
    }
    for (plan, payments) in sim.plans().iter().zip(&year.payments) {
        println!("\n  {}:", plan.name());
        for payment in payments {
            println!("    {payment}");
        }
    }
}
