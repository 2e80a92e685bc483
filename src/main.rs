use std::fmt::Display;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use console::{Style, style};

use iaciq::config::{DEFAULT_GIT_REF, DEFAULT_LOG_LEVEL, DEFAULT_OUTPUT, parse_log_level};
use iaciq::metadata::DEFAULT_FILE_NAMES;
use iaciq::{Report, Repository, Settings, UnknownDependencies};

const ANSI_BLUE: Style = Style::new().blue();

/// Calculate folder processing order based on dependencies.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    /// Git reference to compare for changes.
    #[arg(short = 'r', long, alias = "git_ref", env = "IACIQ_GIT_REF", default_value = DEFAULT_GIT_REF)]
    git_ref: String,

    /// Logging level (e.g. DEBUG, INFO, WARNING, ERROR, CRITICAL).
    #[arg(short = 'l', long, alias = "log_level", env = "IACIQ_LOG", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Metadata file names to search for, in priority order.
    #[arg(short = 'f', long, alias = "meta_files", num_args = 1.., default_values_t = DEFAULT_FILE_NAMES.map(String::from))]
    meta_files: Vec<String>,

    /// Output file name.
    #[arg(short = 'o', long, alias = "output_file", default_value = DEFAULT_OUTPUT)]
    output_file: Utf8PathBuf,

    /// Directory to start looking for the git repository from. The whole
    /// repository is always planned.
    #[arg(short = 'C', long, default_value = ".")]
    root: Utf8PathBuf,

    /// Fail when an action depends on a directory without metadata.
    #[arg(long)]
    strict: bool,
}

impl TryFrom<Args> for Settings {
    type Error = iaciq::ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let settings = Settings {
            root: args.root,
            git_ref: args.git_ref,
            file_names: args.meta_files,
            output: args.output_file,
            log_level: parse_log_level(&args.log_level)?,
            unknown_dependencies: if args.strict {
                UnknownDependencies::Deny
            } else {
                UnknownDependencies::Allow
            },
        };
        settings.validate()?;
        Ok(settings)
    }
}

fn as_overhead(s: Instant) -> impl Display {
    let f = format!("(+{}ms)", s.elapsed().as_millis());
    ANSI_BLUE.apply_to(f)
}

fn run(settings: &Settings) -> anyhow::Result<()> {
    let s = Instant::now();

    let repo = Repository::discover(&settings.root)
        .with_context(|| format!("Error finding Git root directory from '{}'", settings.root))?;
    tracing::debug!("git root directory: {}", repo.root());

    let plan = iaciq::plan(settings, repo.root(), &repo)?;

    Report::new(&plan)
        .write(&settings.output)
        .with_context(|| format!("Error writing output to '{}'", settings.output))?;

    eprintln!(
        "Planned {} of {} actions in {} groups, written to {} {}",
        style(plan.impacted.len()).green(),
        plan.graph.len(),
        style(plan.groups.len()).green(),
        style(&settings.output).blue(),
        as_overhead(s)
    );

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match Settings::try_from(args) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{} {err}", style("error:").red().bold());
            return ExitCode::FAILURE;
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(settings.log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::with_default(subscriber, || match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    })
}
