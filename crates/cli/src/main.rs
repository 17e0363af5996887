//! benv: set up a build environment for the spectra toolchain.
//!
//! Walks the requested packages in order, driving each through its
//! incremental pipeline against a shared install prefix. Repeat runs skip
//! everything whose completion still checks out.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use buildenv_lib::config::BuildConfig;
use buildenv_lib::pipeline::Pipeline;
use buildenv_lib::rules::{Package, rules_for};
use buildenv_lib::state::StateStore;
use buildenv_lib::target::Target;

/// Set up a build environment.
#[derive(Parser)]
#[command(name = "benv", version, about, long_about = None)]
struct Cli {
  /// Directory in which to install the build environment
  #[arg(short, long)]
  prefix: PathBuf,

  /// Packages to build, in order
  #[arg(value_enum, required = true)]
  packages: Vec<Package>,

  /// Target architecture (defaults to the host)
  #[arg(short, long, value_enum)]
  target: Option<Target>,

  /// Root working directory for sources and build files
  #[arg(short, long, default_value = ".")]
  root: PathBuf,

  /// Number of parallel jobs for the wrapped build tools
  #[arg(short, long)]
  jobs: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .without_time()
    .init();

  let cli = Cli::parse();

  let target = match cli.target {
    Some(target) => target,
    None => Target::host().context("unsupported host architecture; pass --target explicitly")?,
  };

  let jobs = match cli.jobs {
    Some(jobs) => jobs,
    None => std::thread::available_parallelism().map_or(1, |n| n.get()),
  };

  let prefix = absolute(&cli.prefix)?;
  let config = BuildConfig::new(cli.root, prefix, target, jobs);

  info!(target = %config.target, prefix = %config.prefix.display(), jobs, "starting");

  let mut store = StateStore::open(config.state_db_path())
    .with_context(|| format!("failed to open state store at {}", config.state_db_path().display()))?;

  for package in &cli.packages {
    let rules = rules_for(*package, &config)?;
    rules
      .source()
      .ensure_fetched(&mut store, config.target)
      .with_context(|| format!("failed to fetch sources for {package}"))?;

    let mut pipeline = Pipeline::new(rules);
    if pipeline.rules().is_packager() {
      pipeline
        .pack()
        .with_context(|| format!("failed to pack {package}"))?;
      println!("  {package}: packed");
    } else {
      pipeline
        .install()
        .with_context(|| format!("failed to install {package}"))?;
      println!("  {package}: installed");
    }
  }

  store.close().context("failed to flush state store")?;

  println!();
  println!("Build environment ready!");
  println!("  Target: {}", config.target);
  println!("  Prefix: {}", config.prefix.display());
  Ok(())
}

/// Normalize a (possibly not-yet-existing) path to an absolute one.
fn absolute(path: &PathBuf) -> Result<PathBuf> {
  if path.is_absolute() {
    return Ok(dunce::simplified(path).to_path_buf());
  }
  let cwd = std::env::current_dir().context("cannot determine working directory")?;
  Ok(dunce::simplified(&cwd.join(path)).to_path_buf())
}
