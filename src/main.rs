mod document;
mod error;
mod export;
mod filter;
mod merge;
mod normalize;
mod pipeline;
mod profile;
mod purge;
mod record;
mod report;
mod settings;
mod strategy;
mod text;
mod upload;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use pipeline::RunOptions;
use profile::Profile;
use settings::Settings;
use strategy::StrategyMode;

#[derive(Parser)]
#[command(name = "leadscrape", about = "Extract lead records from saved HTML snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProfileArgs {
    /// Built-in profile, or `<profile_dir>/<name>.json` when configured
    #[arg(short, long, required_unless_present = "profile_file", conflicts_with = "profile_file")]
    profile: Option<String>,
    /// Profile rule table as a JSON file
    #[arg(long)]
    profile_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every *.html in a directory and export one table
    Run {
        /// Directory of saved snapshots
        #[arg(short, long)]
        input: PathBuf,
        /// Output file (.xlsx or .csv); default <profile>_leads_<timestamp>.xlsx
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        profile: ProfileArgs,
        /// Earlier export whose keys are skipped
        #[arg(long)]
        prior: Option<PathBuf>,
        /// Also write the prior rows ahead of the new ones
        #[arg(long, requires = "prior")]
        append: bool,
        /// Stop at the first strategy that finds anything per document
        #[arg(long)]
        first_non_empty: bool,
        /// Delete the input snapshots after a successful export
        #[arg(long)]
        purge: bool,
        /// POST the export to the configured webhook
        #[arg(long)]
        upload: bool,
    },
    /// Show what each strategy finds in one snapshot
    Inspect {
        file: PathBuf,
        #[command(flatten)]
        profile: ProfileArgs,
        #[arg(long)]
        first_non_empty: bool,
        /// Print the merged rows as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List the built-in profiles
    Profiles,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_profile(args: &ProfileArgs, settings: &Settings) -> anyhow::Result<Profile> {
    match (&args.profile_file, &args.profile) {
        (Some(path), _) => Profile::from_file(path)
            .with_context(|| format!("loading profile {}", path.display())),
        (None, Some(name)) => Profile::resolve(name, settings.profile_dir.as_deref())
            .with_context(|| format!("loading profile `{}`", name)),
        (None, None) => anyhow::bail!("either --profile or --profile-file is required"),
    }
}

fn mode(first_non_empty: bool) -> StrategyMode {
    if first_non_empty {
        StrategyMode::FirstNonEmpty
    } else {
        StrategyMode::All
    }
}

fn default_output(profile: &Profile) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("{}_leads_{}.xlsx", profile.name, stamp))
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("loading settings")?;
    info!(settings = ?settings, "starting");

    match cli.command {
        Commands::Run {
            input,
            output,
            profile,
            prior,
            append,
            first_non_empty,
            purge,
            upload,
        } => {
            let profile = load_profile(&profile, &settings)?;
            let opts = RunOptions {
                output: output.unwrap_or_else(|| default_output(&profile)),
                input,
                prior,
                append,
                mode: mode(first_non_empty),
                purge,
                upload,
            };
            println!("Profile: {} ({})", profile.name, profile.description);
            let report = pipeline::run(&profile, &settings, &opts)
                .with_context(|| format!("run over {}", opts.input.display()))?;
            if report.nothing_to_do() {
                println!("No *.html documents in {}: nothing to do.", opts.input.display());
                return Ok(());
            }
            report.print();
        }
        Commands::Inspect {
            file,
            profile,
            first_non_empty,
            json,
        } => {
            let profile = load_profile(&profile, &settings)?;
            inspect(&profile, &file, mode(first_non_empty), json)?;
        }
        Commands::Profiles => {
            for name in profile::builtin_names() {
                let p = Profile::builtin(name)?;
                println!("{:<20} {}", p.name, p.description);
                let columns: Vec<&str> = p.columns.iter().map(|c| c.header.as_str()).collect();
                println!("{:<20} columns: {}", "", columns.join(", "));
                println!("{:<20} key: {}", "", p.key_fields.join(" > "));
            }
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }
    Ok(())
}

fn inspect(profile: &Profile, file: &Path, mode: StrategyMode, json: bool) -> anyhow::Result<()> {
    let found = pipeline::inspect(profile, file, mode)
        .with_context(|| format!("inspecting {}", file.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&found.table.rows)?);
        return Ok(());
    }

    for (kind, n) in &found.extraction.counts {
        println!("  {:<12} {}", kind.as_str(), n);
    }
    println!("\n{} merged rows", found.table.len());
    if found.table.is_empty() {
        return Ok(());
    }

    let headers = found.table.headers();
    println!("{}", headers.join(" | "));
    println!("{}", "-".repeat(80));
    for row in &found.table.rows {
        let cells: Vec<String> = found
            .table
            .cells(row)
            .into_iter()
            .map(|c| truncate(c, 32))
            .collect();
        println!("{}", cells.join(" | "));
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
