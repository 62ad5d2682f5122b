//! cdi - Consolidation-Disruption Index from EuropePMC citation data
//!
//! Usage: cdi [OPTIONS] <COMMAND>
//!
//! Logging goes to stderr and is controlled by `CDI_LOG` (an `EnvFilter`
//! directive such as `cdi_lib=debug`). Results go to stdout.

use std::path::PathBuf;

use cdi_lib::{
    compute_cdi, run_batch, BatchOptions, Bibliographic, CdiReport, EuropePmcClient, Pmid, Settings,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde_json::json;
use tracing::error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Main CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "cdi")]
#[command(version, about = "Consolidation-Disruption Index for PubMed articles", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (default: <data dir>/cdi-engine/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the CDI of one or more articles
    Compute {
        /// PubMed IDs
        #[arg(required = true)]
        pmids: Vec<Pmid>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the first publication date and source of an article
    Date {
        pmid: Pmid,
    },
    /// Score every pending row of an article table
    Batch {
        /// Working table, checkpointed during the run
        #[arg(long)]
        input: Option<PathBuf>,
        /// Table written at the end with year/month columns
        #[arg(long)]
        output: Option<PathBuf>,
        /// Save the working table after this many articles
        #[arg(long)]
        checkpoint_every: Option<usize>,
        /// Score every row with a PMID, including scored ones
        #[arg(long)]
        recompute: bool,
    },
    /// Show the effective settings
    Config {
        /// Persist the effective settings to the settings file
        #[arg(long)]
        write: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    // Exit cleanly when stdout is a closed pipe (`cdi compute ... | head`).
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if info.to_string().contains("Broken pipe") {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run_cli(cli) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let fallback = if verbose {
        "cdi=debug,cdi_lib=debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_env("CDI_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_cli(cli: Cli) -> Result<(), String> {
    if let Commands::Completions { shell } = &cli.command {
        generate(*shell, &mut Cli::command(), "cdi", &mut std::io::stdout());
        return Ok(());
    }

    let settings_path = cli.config.unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&settings_path);
    tracing::debug!(path = %settings_path.display(), "settings loaded");

    match cli.command {
        Commands::Compute { pmids, json } => handle_compute(&settings, &pmids, json),
        Commands::Date { pmid } => handle_date(&settings, pmid),
        Commands::Batch { input, output, checkpoint_every, recompute } => {
            let mut options = BatchOptions::from_settings(&settings);
            if let Some(input) = input {
                options.input = input;
            }
            if let Some(output) = output {
                options.output = output;
            }
            if let Some(n) = checkpoint_every {
                options.checkpoint_every = n;
            }
            options.recompute = recompute;
            handle_batch(&settings, &options)
        }
        Commands::Config { write } => {
            let content = serde_json::to_string_pretty(&settings)
                .map_err(|e| format!("Failed to serialize settings: {}", e))?;
            println!("{}", content);
            if write {
                settings.save(&settings_path)?;
                eprintln!("Settings written to {}", settings_path.display());
            }
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

fn client(settings: &Settings) -> Result<EuropePmcClient, String> {
    EuropePmcClient::new(settings).map_err(|e| format!("Failed to create EuropePMC client: {}", e))
}

// ============================================================================
// Handlers
// ============================================================================

fn handle_compute(settings: &Settings, pmids: &[Pmid], json: bool) -> Result<(), String> {
    let client = client(settings)?;
    let mut failed = 0;
    let mut rows = Vec::with_capacity(pmids.len());

    for &pmid in pmids {
        match compute_cdi(&client, pmid) {
            Ok(report) => {
                if json {
                    rows.push(json!(report));
                } else {
                    println!("{}", format_report(&report));
                }
            }
            Err(e) => {
                failed += 1;
                error!(pmid = %e.pmid(), "{}", e);
                if json {
                    rows.push(json!({ "pmid": e.pmid(), "error": e.to_string() }));
                } else {
                    println!("{}\terror", e.pmid());
                }
            }
        }
    }

    if json {
        let out = serde_json::to_string_pretty(&rows).map_err(|e| e.to_string())?;
        println!("{}", out);
    }

    if failed > 0 {
        return Err(format!("{} of {} articles could not be scored", failed, pmids.len()));
    }
    Ok(())
}

fn format_report(report: &CdiReport) -> String {
    match (report.score, report.unscorable) {
        (Some(score), _) => format!(
            "{}\t{:.2}\t({} citers: {} disruptive, {} consolidating, {} skipped)",
            report.pmid,
            score,
            report.citers,
            report.disruptive,
            report.consolidating,
            report.skipped
        ),
        (None, Some(reason)) => format!("{}\tNA\t({})", report.pmid, reason.as_str()),
        (None, None) => format!("{}\tNA", report.pmid),
    }
}

fn handle_date(settings: &Settings, pmid: Pmid) -> Result<(), String> {
    let client = client(settings)?;
    let article = client.lookup_article(pmid).map_err(|e| e.to_string())?;
    println!("{}\t{}", article.first_publication_date.format("%Y-%m-%d"), article.source);
    Ok(())
}

fn handle_batch(settings: &Settings, options: &BatchOptions) -> Result<(), String> {
    let client = client(settings)?;
    let summary = run_batch(&client, options).map_err(|e| e.to_string())?;
    println!("{}", summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_compute_parses_float_pmids() {
        let cli = Cli::try_parse_from(["cdi", "compute", "123", "456.0", "--json"]).unwrap();
        match cli.command {
            Commands::Compute { pmids, json } => {
                assert_eq!(pmids.iter().map(|p| p.get()).collect::<Vec<_>>(), vec![123, 456]);
                assert!(json);
            }
            _ => panic!("expected compute"),
        }
    }

    #[test]
    fn test_compute_rejects_bad_pmid() {
        assert!(Cli::try_parse_from(["cdi", "compute", "abc"]).is_err());
        assert!(Cli::try_parse_from(["cdi", "compute"]).is_err());
    }

    #[test]
    fn test_batch_flags() {
        let cli = Cli::try_parse_from([
            "cdi",
            "--config",
            "/tmp/s.json",
            "batch",
            "--input",
            "in.csv",
            "--checkpoint-every",
            "10",
            "--recompute",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.json")));
        match cli.command {
            Commands::Batch { input, output, checkpoint_every, recompute } => {
                assert_eq!(input, Some(PathBuf::from("in.csv")));
                assert_eq!(output, None);
                assert_eq!(checkpoint_every, Some(10));
                assert!(recompute);
            }
            _ => panic!("expected batch"),
        }
    }

    #[test]
    fn test_format_unscorable_report() {
        let pmid = Pmid::new(42).unwrap();
        let report = CdiReport {
            pmid,
            score: None,
            unscorable: Some(cdi_lib::Unscorable::NoCitations),
            publication_date: None,
            references: 3,
            citers: 0,
            disruptive: 0,
            consolidating: 0,
            skipped: 0,
        };
        assert_eq!(format_report(&report), "42\tNA\t(no citations)");
    }
}
