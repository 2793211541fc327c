mod aggregate;
mod board;
mod catalog;
mod error;
mod filter;
mod logging;
mod metadata;
mod probe;
mod scheduler;
mod settings;
mod traits;
mod types;
mod view;

use aggregate::Aggregation;
use anyhow::{bail, Result};
use catalog::Catalog;
use clap::{Args, Parser, Subcommand};
use filter::{FilterChange, FilterState};
use indicatif::{ProgressBar, ProgressStyle};
use probe::HttpProber;
use scheduler::Controller;
use settings::{Order, Settings, TimeoutPolicy};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "webping")]
#[command(about = "Measure latency from this machine to cloud provider regions", long_about = None)]
struct Cli {
    /// Catalog file or URL (defaults to ~/.config/webping/catalog.json, then built-in)
    #[arg(long, global = true)]
    catalog: Option<String>,

    /// Settings file (defaults to ~/.config/webping/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List providers and regions in the catalog (e.g., webping list --provider aws)
    List {
        /// Only show this provider
        #[arg(long, short)]
        provider: Option<String>,

        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },
    /// Continuously ping regions and keep a live table (e.g., webping ping --geo Europe)
    Ping {
        #[command(flatten)]
        filters: FilterArgs,

        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Run a fixed number of passes and print the ranking (e.g., webping bench --passes 5)
    Bench {
        #[command(flatten)]
        filters: FilterArgs,

        #[command(flatten)]
        tuning: TuningArgs,

        /// Number of passes over all selected regions
        #[arg(long, default_value_t = 3)]
        passes: u64,

        /// Print the ranking as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Provider key to include (repeatable). Defaults to all.
    #[arg(long, short)]
    provider: Vec<String>,

    /// Country code to include (repeatable). Defaults to all.
    #[arg(long, short)]
    country: Vec<String>,

    /// Include every country of a geo group, e.g. "Europe" (repeatable)
    #[arg(long, short)]
    geo: Vec<String>,
}

#[derive(Args)]
struct TuningArgs {
    #[arg(long, value_enum)]
    aggregate: Option<Aggregation>,

    #[arg(long, value_enum)]
    order: Option<Order>,

    #[arg(long, value_enum)]
    timeout_policy: Option<TimeoutPolicy>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    interval_ms: Option<u64>,

    /// Probes per region per pass; the lowest is kept
    #[arg(long)]
    probes_per_pair: Option<u32>,

    /// Forget collected samples whenever the filter changes
    #[arg(long)]
    reset_on_restart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    let catalog = Catalog::load(cli.catalog.as_deref()).await?;

    match cli.command {
        Commands::List { provider, json } => handle_list(&catalog, provider, json)?,
        Commands::Ping { filters, tuning } => {
            let settings = load_settings(cli.config, &tuning).await?;
            handle_ping(catalog, &filters, settings).await?
        }
        Commands::Bench {
            filters,
            tuning,
            passes,
            json,
        } => {
            let settings = load_settings(cli.config, &tuning).await?;
            handle_bench(catalog, &filters, settings, passes, json).await?
        }
    }

    Ok(())
}

async fn load_settings(path: Option<PathBuf>, tuning: &TuningArgs) -> Result<Settings> {
    let mut settings = match path {
        Some(path) => Settings::load_from(&path).await?,
        None => Settings::load().await?,
    };

    // CLI flags win over the config file
    if let Some(aggregate) = tuning.aggregate {
        settings.aggregate = aggregate;
    }
    if let Some(order) = tuning.order {
        settings.order = order;
    }
    if let Some(policy) = tuning.timeout_policy {
        settings.timeout_policy = policy;
    }
    if let Some(ms) = tuning.timeout_ms {
        settings.timeout_ms = ms;
    }
    if let Some(ms) = tuning.interval_ms {
        settings.interval_ms = ms;
    }
    if let Some(n) = tuning.probes_per_pair {
        settings.probes_per_pair = n;
    }
    if tuning.reset_on_restart {
        settings.reset_on_restart = true;
    }

    settings.validate()?;
    Ok(settings)
}

/// Start from "everything selected", narrowed by whatever flags were given.
fn initial_filter(catalog: &Catalog, args: &FilterArgs) -> Result<FilterState> {
    let providers = if args.provider.is_empty() {
        catalog.provider_keys()
    } else {
        args.provider
            .iter()
            .map(|p| catalog.provider(p).map(|cp| cp.key.clone()))
            .collect::<error::Result<Vec<_>>>()?
    };

    let countries = if args.country.is_empty() && args.geo.is_empty() {
        catalog.countries()
    } else {
        let mut countries = Vec::new();
        for code in &args.country {
            // Fail loudly on typos instead of silently selecting nothing
            metadata::country_name(code)?;
            countries.push(code.to_ascii_uppercase());
        }
        for geo in &args.geo {
            countries.extend(catalog.geo_countries(geo)?);
        }
        countries
    };

    Ok(FilterState::new(providers, countries))
}

fn probeable_pairs(catalog: &Catalog, filter: &FilterState) -> u64 {
    catalog
        .pairs()
        .iter()
        .filter(|(p, r)| r.is_probeable() && filter.allows(&p.key, &r.country))
        .count() as u64
}

/// Total probes a bench run will make, for the progress bar.
fn expected_samples(pairs: u64, passes: u64) -> Result<u64> {
    if pairs == 0 {
        bail!("None of the selected regions has a probe endpoint.");
    }
    match pairs.checked_mul(passes) {
        Some(total) => Ok(total),
        None => bail!("--passes {} is too large for {} regions", passes, pairs),
    }
}

// --- Handlers ---

fn handle_list(catalog: &Catalog, provider: Option<String>, json: bool) -> Result<()> {
    let providers = match provider {
        Some(key) => vec![catalog.provider(&key)?.clone()],
        None => catalog.providers().to_vec(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&providers)?);
        return Ok(());
    }

    println!("{}", "-".repeat(100));
    println!(
        "{:<14} {:<26} {:<36} {:<16} Probe",
        "Provider", "Region", "Location", "Geo"
    );
    println!("{}", "-".repeat(100));

    for provider in &providers {
        for region in &provider.regions {
            let location = format!(
                "{}, {}",
                region.location,
                metadata::country_name(&region.country)?
            );
            println!(
                "{:<14} {:<26} {:<36} {:<16} {}",
                provider.key,
                region.key,
                location,
                region.geo,
                if region.is_probeable() { "yes" } else { "-" }
            );
        }
    }
    println!("{}", "-".repeat(100));

    Ok(())
}

enum Command {
    Change(FilterChange),
    Reset,
    Quit,
}

fn parse_command(catalog: &Catalog, line: &str) -> Result<Command> {
    let mut parts = line.trim().splitn(2, ' ');
    let verb = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    let command = match (verb, arg) {
        ("q", _) | ("quit", _) => Command::Quit,
        ("r", _) | ("reset", _) => Command::Reset,
        ("p", key) if !key.is_empty() => {
            Command::Change(FilterChange::Provider(catalog.provider(key)?.key.clone()))
        }
        ("c", code) if !code.is_empty() => {
            metadata::country_name(code)?;
            Command::Change(FilterChange::Country(code.to_ascii_uppercase()))
        }
        ("g", geo) if !geo.is_empty() => {
            Command::Change(FilterChange::Geo(geo.to_string(), catalog.geo_countries(geo)?))
        }
        _ => bail!("Unknown command '{}'", line.trim()),
    };
    Ok(command)
}

fn redraw(catalog: &Catalog, controller: &Controller, status: &str) -> Result<()> {
    let filter = controller.filter();
    let board = controller.board();
    let rows = view::visible_rows(board.snapshot(), &filter);

    // Clear screen, cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
    println!(
        "Providers: {}   Countries: {}   Aggregate: {:?}   Measured: {}{}",
        join_or_none(filter.providers().iter()),
        join_or_none(filter.countries().iter()),
        board.aggregation(),
        board.len(),
        if controller.is_running() { "" } else { "   (idle)" }
    );
    println!();
    print!("{}", view::render_table(&rows)?);

    let waiting = probeable_pairs(catalog, &filter).saturating_sub(rows.len() as u64);
    if waiting > 0 {
        println!("{} region(s) waiting for a first sample", waiting);
    }
    println!();
    println!("Commands: p <provider> | c <country> | g <geo> | r (reset) | q (quit)");
    if !status.is_empty() {
        println!("{}", status);
    }
    Ok(())
}

fn join_or_none<'a>(values: impl Iterator<Item = &'a String>) -> String {
    let joined = values.map(String::as_str).collect::<Vec<_>>().join(",");
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined
    }
}

async fn handle_ping(catalog: Catalog, filters: &FilterArgs, settings: Settings) -> Result<()> {
    let filter = initial_filter(&catalog, filters)?;
    let catalog = Arc::new(catalog);
    let prober = Arc::new(HttpProber::new(settings.timeout())?);

    let mut controller = Controller::new(Arc::clone(&catalog), filter, prober, settings);
    controller.start();

    let board = controller.board();
    let mut changes = board.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut status = String::new();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    redraw(&catalog, &controller, &status)?;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                status.clear();
                match parse_command(&catalog, &line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Reset) => controller.reset_samples(),
                    Ok(Command::Change(change)) => {
                        controller.apply(&change);
                        if !controller.filter().is_runnable() {
                            status = "Nothing selected: pick at least one provider and one country.".to_string();
                        }
                    }
                    Err(e) => status = format!("Error: {}", e),
                }
            }
        }
        redraw(&catalog, &controller, &status)?;
    }

    controller.shutdown().await;
    println!();
    Ok(())
}

async fn handle_bench(
    catalog: Catalog,
    filters: &FilterArgs,
    settings: Settings,
    passes: u64,
    json: bool,
) -> Result<()> {
    if passes == 0 {
        bail!("--passes must be at least 1");
    }

    let filter = initial_filter(&catalog, filters)?;
    if !filter.is_runnable() {
        bail!("No provider or country selected.");
    }
    let expected = expected_samples(probeable_pairs(&catalog, &filter), passes)?;

    let catalog = Arc::new(catalog);
    let prober = Arc::new(HttpProber::new(settings.timeout())?);
    let mut controller =
        Controller::new(Arc::clone(&catalog), filter, prober, settings).with_max_passes(passes);
    let board = controller.board();
    let mut changes = board.subscribe();

    let pb = ProgressBar::new(expected);
    pb.set_style(
        ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("|| "),
    );
    pb.set_message("Pinging...");

    controller.start();
    {
        let join = controller.join();
        tokio::pin!(join);
        loop {
            tokio::select! {
                res = &mut join => {
                    res?;
                    break;
                }
                changed = changes.changed() => {
                    if changed.is_ok() {
                        pb.set_position(board.total_samples().min(expected));
                    }
                }
            }
        }
    }
    pb.finish_with_message("Done.");

    let rows = view::visible_rows(board.snapshot(), &controller.filter());

    if json {
        println!("{}", serde_json::to_string_pretty(&view::report(&rows)?)?);
        return Ok(());
    }

    println!();
    print!("{}", view::render_table(&rows)?);

    let Some(best) = view::nearest(&rows) else {
        bail!("No region answered. Please check your network connection.");
    };
    println!("{}", "-".repeat(112));
    println!(
        "Nearest region: {} {} ({}, {}) at {}ms.",
        best.provider.display_name,
        best.region.key,
        best.region.location,
        metadata::country_name(&best.region.country)?,
        best.latency_ms.unwrap_or_default().round() as u64
    );
    println!("Share it: {}", view::share_link(best)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_samples() {
        assert_eq!(expected_samples(4, 3).unwrap(), 12);
        assert!(expected_samples(0, 3).is_err());
    }

    #[test]
    fn test_expected_samples_overflow() {
        let err = expected_samples(2, u64::MAX).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
