//! Command-line interface for the harvester.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{validate_gesetzesnummer, RisEndpoints, MIN_TOC_BODY_LEN};
use crate::enrich::{enrich_registry, EnrichOptions};
use crate::error::{HarvestError, Result};
use crate::export::{run_export, ExportOptions};
use crate::http::{create_client, fetch_html, RetryPolicy};
use crate::jsonl::JsonlWriter;
use crate::probe::{BoundaryResolver, ProbeLimits};
use crate::registry::LawRegistry;
use crate::toc::parse_toc;
use crate::types::{LawDescriptor, UnitKind};

/// RIS Harvester - Export Austrian federal law from the RIS portal as JSON Lines.
#[derive(Parser)]
#[command(name = "ris-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export a law as JSON Lines, one record per unit (placeholders included).
    Export {
        /// Registry short name (e.g., ABGB) or Gesetzesnummer (e.g., 10001622)
        law: String,

        /// Output file path
        #[arg(short, long)]
        out: PathBuf,

        /// Display name override for the `law` field of every record
        #[arg(long)]
        law_name: Option<String>,

        /// First unit number
        #[arg(long, default_value_t = 1)]
        start: u32,

        /// Last unit number (default: resolved from TOC/probing)
        #[arg(long)]
        end: Option<u32>,

        /// Seconds to pause between requests
        #[arg(long, default_value_t = 1.2)]
        delay: f64,

        /// Keep repealed units in the exported sequence
        #[arg(long)]
        include_repealed: bool,

        /// TOC version date (FassungVom) in YYYY-MM-DD format
        #[arg(long)]
        toc_date: Option<String>,

        /// Registry file (default: bundled registry)
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Probe ceiling override
        #[arg(long)]
        probe_max: Option<u32>,

        /// Probe early-exit bound override
        #[arg(long)]
        probe_early_exit: Option<u32>,
    },

    /// Fetch and print a law's table of contents as JSON.
    Toc {
        /// Registry short name or Gesetzesnummer
        law: String,

        /// TOC version date (FassungVom) in YYYY-MM-DD format
        #[arg(long)]
        toc_date: Option<String>,

        /// Keep repealed units in the unit list
        #[arg(long)]
        include_repealed: bool,

        /// Registry file (default: bundled registry)
        #[arg(long)]
        registry: Option<PathBuf>,
    },

    /// Resolve the highest unit number of a law by probing the portal.
    Probe {
        /// Registry short name or Gesetzesnummer
        law: String,

        /// Registry file (default: bundled registry)
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Probe ceiling override
        #[arg(long)]
        probe_max: Option<u32>,

        /// Probe early-exit bound override
        #[arg(long)]
        probe_early_exit: Option<u32>,
    },

    /// Fill in missing fallback bounds in a registry file.
    Enrich {
        /// Input registry file
        #[arg(long)]
        registry: PathBuf,

        /// Output registry file
        #[arg(short, long)]
        out: PathBuf,

        /// Recompute bounds that are already present
        #[arg(long)]
        overwrite_existing: bool,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            law,
            out,
            law_name,
            start,
            end,
            delay,
            include_repealed,
            toc_date,
            registry,
            probe_max,
            probe_early_exit,
        } => export_command(&ExportArgs {
            law,
            out,
            law_name,
            start,
            end,
            delay,
            include_repealed,
            toc_date,
            registry,
            probe_max,
            probe_early_exit,
        }),
        Commands::Toc {
            law,
            toc_date,
            include_repealed,
            registry,
        } => toc_command(&law, toc_date.as_deref(), include_repealed, registry.as_deref()),
        Commands::Probe {
            law,
            registry,
            probe_max,
            probe_early_exit,
        } => probe_command(&law, registry.as_deref(), probe_max, probe_early_exit),
        Commands::Enrich {
            registry,
            out,
            overwrite_existing,
        } => enrich_command(&registry, &out, overwrite_existing),
    }
}

/// Export command arguments, bundled to keep the dispatch readable.
struct ExportArgs {
    law: String,
    out: PathBuf,
    law_name: Option<String>,
    start: u32,
    end: Option<u32>,
    delay: f64,
    include_repealed: bool,
    toc_date: Option<String>,
    registry: Option<PathBuf>,
    probe_max: Option<u32>,
    probe_early_exit: Option<u32>,
}

/// Load the registry from a path, or the bundled one.
fn load_registry(path: Option<&Path>) -> Result<LawRegistry> {
    match path {
        Some(path) => LawRegistry::from_path(path),
        None => LawRegistry::bundled(),
    }
}

/// Resolve a CLI law identifier to a descriptor.
///
/// Unknown identifiers are accepted when they are valid registry numbers;
/// everything about them is then discovered live.
fn resolve_descriptor(registry: &LawRegistry, identifier: &str) -> Result<LawDescriptor> {
    if let Some(descriptor) = registry.find(identifier) {
        return Ok(descriptor.clone());
    }
    validate_gesetzesnummer(identifier)
        .map_err(|_| HarvestError::LawNotFound(identifier.to_string()))?;
    Ok(LawDescriptor {
        kurz: identifier.to_string(),
        titel: None,
        gesetzesnummer: identifier.to_string(),
        unit_type: None,
        fallback_end: None,
        fallback_source: None,
        has_paragraphs: false,
        has_articles: false,
    })
}

/// Apply CLI probe overrides to the default limits.
fn probe_limits(probe_max: Option<u32>, probe_early_exit: Option<u32>) -> ProbeLimits {
    let mut limits = ProbeLimits::default();
    if let Some(max_bound) = probe_max {
        limits.max_bound = max_bound;
    }
    if let Some(early_exit) = probe_early_exit {
        limits.early_exit_bound = early_exit;
    }
    limits
}

/// Execute the export command.
fn export_command(args: &ExportArgs) -> Result<()> {
    let registry = load_registry(args.registry.as_deref())?;
    let descriptor = resolve_descriptor(&registry, &args.law)?;
    let law_name = args.law_name.clone().unwrap_or_else(|| descriptor.kurz.clone());
    let kinds = descriptor.export_kinds();

    println!(
        "{} {} ({}) {} {}",
        style("Exporting").bold(),
        style(&law_name).cyan(),
        style(&descriptor.gesetzesnummer).dim(),
        style("to").bold(),
        style(args.out.display()).green()
    );
    println!();

    let client = create_client()?;
    let mut writer = JsonlWriter::create(&args.out)?;
    let limits = probe_limits(args.probe_max, args.probe_early_exit);

    for kind in kinds {
        // The registry fallback bound applies to the authoritative
        // sequence only.
        let fallback_end = match descriptor.unit_type {
            Some(unit_type) if unit_type == kind => descriptor.fallback_end,
            None => descriptor.fallback_end,
            _ => None,
        };

        let opts = ExportOptions {
            law_name: law_name.clone(),
            gesetzesnummer: descriptor.gesetzesnummer.clone(),
            kind,
            start: args.start,
            end: args.end,
            delay: Duration::from_secs_f64(args.delay.max(0.0)),
            include_repealed: args.include_repealed,
            toc_date: args.toc_date.clone(),
            fallback_end,
            limits: limits.clone(),
            policy: RetryPolicy::default(),
            endpoints: RisEndpoints::default(),
        };

        let summary = run_export(&client, &opts, &mut writer)?;

        println!(
            "  {} {} {}..{}: {} records ({} base of {} expected, {} suffix)",
            style(kind.symbol()).bold(),
            style("sequence").bold(),
            summary.start,
            summary.end,
            style(summary.records_written).green(),
            summary.base_records,
            summary.expected_base,
            summary.suffix_records
        );
    }

    println!();
    println!(
        "{} {} records -> {}",
        style("Done:").green().bold(),
        writer.written(),
        args.out.display()
    );

    Ok(())
}

/// Execute the toc command.
fn toc_command(
    law: &str,
    toc_date: Option<&str>,
    include_repealed: bool,
    registry: Option<&Path>,
) -> Result<()> {
    let registry = load_registry(registry)?;
    let descriptor = resolve_descriptor(&registry, law)?;
    let kind = descriptor
        .export_kinds()
        .first()
        .copied()
        .unwrap_or(UnitKind::Paragraf);

    if let Some(date) = toc_date {
        crate::config::validate_date(date)?;
    }

    let spinner = make_spinner("Fetching table of contents...");
    let client = create_client()?;
    let endpoints = RisEndpoints::default();
    let url = endpoints.toc_url(&descriptor.gesetzesnummer, kind, toc_date);
    let html = match fetch_html(&client, RetryPolicy::default(), &url, MIN_TOC_BODY_LEN) {
        Ok(html) => html,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };
    spinner.finish_and_clear();

    let listing = parse_toc(&html, kind, include_repealed);
    let summary = serde_json::json!({
        "gesetzesnummer": descriptor.gesetzesnummer,
        "fassung_vom": toc_date.unwrap_or("geltende Fassung"),
        "unit_type": kind.as_str(),
        "count": listing.units.len(),
        "units": listing.units.iter().map(|u| u.display(kind)).collect::<Vec<_>>(),
        "repealed": listing.repealed.iter().map(|u| u.display(kind)).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

/// Execute the probe command.
fn probe_command(
    law: &str,
    registry: Option<&Path>,
    probe_max: Option<u32>,
    probe_early_exit: Option<u32>,
) -> Result<()> {
    let registry = load_registry(registry)?;
    let descriptor = resolve_descriptor(&registry, law)?;
    let kind = descriptor
        .export_kinds()
        .first()
        .copied()
        .unwrap_or(UnitKind::Paragraf);

    println!(
        "{} {} ({}) as {}",
        style("Probing").bold(),
        style(&descriptor.kurz).cyan(),
        style(&descriptor.gesetzesnummer).dim(),
        kind.symbol()
    );

    let spinner = make_spinner("Probing unit boundary...");
    let client = create_client()?;
    let endpoints = RisEndpoints::default();
    let mut cache = crate::cache::PageCache::default();
    let mut resolver = BoundaryResolver::new(
        &client,
        RetryPolicy::default(),
        &endpoints,
        probe_limits(probe_max, probe_early_exit),
        &mut cache,
    );
    let bound = resolver.resolve_bound(&descriptor.gesetzesnummer, kind);
    spinner.finish_and_clear();

    match bound? {
        Some(bound) => {
            println!(
                "{} {} {}",
                style("Boundary:").green().bold(),
                kind.symbol(),
                style(bound).green()
            );
            Ok(())
        }
        None => Err(HarvestError::BoundaryUnresolved {
            gesetzesnummer: descriptor.gesetzesnummer,
        }),
    }
}

/// Execute the enrich command.
fn enrich_command(registry_path: &Path, out: &Path, overwrite_existing: bool) -> Result<()> {
    let mut registry = LawRegistry::from_path(registry_path)?;

    println!(
        "{} {} laws from {}",
        style("Enriching").bold(),
        style(registry.laws().len()).cyan(),
        registry_path.display()
    );

    let client = create_client()?;
    let opts = EnrichOptions {
        overwrite_existing,
        ..EnrichOptions::default()
    };
    let outcome = enrich_registry(&client, &mut registry, &opts)?;
    registry.save(out)?;

    println!(
        "{} {} changed, {} unchanged -> {}",
        style("Done:").green().bold(),
        style(outcome.changed).green(),
        outcome.unchanged,
        out.display()
    );

    Ok(())
}

/// Create a steady-tick spinner.
fn make_spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}
