//! `folio`: runs and inspects the on-device content-store lifecycle.
//!
//! Reads `folio.toml` (or the path given with `--config`) plus `FOLIO__*`
//! environment overrides, e.g. `FOLIO__DATA_DIR=/var/lib/folio`.
//!
//! # Usage
//!
//! ```text
//! folio start
//! folio health
//! folio reinstall
//! folio uid --title "İkinci Makam" --position 2 \
//!   --ancestor "Onuncu Söz:10" --ancestor "Birinci Makam:1"
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use folio_core::identity::{Ancestor, Position, SectionSeed};
use folio_store_sqlite::{ContentLifecycle, Settings};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "folio", version, about = "Folio content-store lifecycle manager")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "folio.toml")]
  config: PathBuf,

  /// Override the private storage directory.
  #[arg(long, value_name = "DIR")]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Install, migrate, patch, and gate the store. Exits 1 with the fatal
  /// error JSON on failure.
  Start,
  /// Run the health gate on the installed store.
  Health,
  /// Print diagnostics for the installed store.
  Diagnose,
  /// Replace the installed store with the bundled copy.
  Reinstall,
  /// Allow one more automatic repair attempt.
  ResetSelfHeal,
  /// Print the stable identifier for a section.
  Uid {
    #[arg(long)]
    title:    String,
    /// Integer or fractional position; `null` when absent.
    #[arg(long, value_parser = parse_position)]
    position: Position,
    /// `TITLE:POS`, outermost first. Repeatable.
    #[arg(long = "ancestor", value_parser = parse_ancestor)]
    ancestors: Vec<Ancestor>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if let Command::Uid { title, position, ancestors } = &cli.command {
    let seed = SectionSeed::new(title, *position, ancestors);
    println!("{}\t{seed}", seed.uid());
    return Ok(());
  }

  let settings = load_settings(&cli)?;
  let mut lifecycle = ContentLifecycle::new(settings).context("invalid corpus profile")?;

  match cli.command {
    Command::Start => match lifecycle.start().await {
      Ok(report) => print_json(&report)?,
      Err(fatal) => {
        lifecycle.close().await.ok();
        eprintln!("{fatal}");
        std::process::exit(1);
      }
    },
    Command::Health => {
      let report = lifecycle.check_health().await.context("health check failed")?;
      print_json(&report)?;
      if !report.healthy {
        lifecycle.close().await.ok();
        std::process::exit(1);
      }
    }
    Command::Diagnose => {
      let diagnostics = lifecycle.diagnostics().await.context("diagnostics failed")?;
      print_json(&diagnostics)?;
    }
    Command::Reinstall => {
      let outcome = lifecycle.reinstall().await.context("reinstall failed")?;
      print_json(&outcome)?;
    }
    Command::ResetSelfHeal => {
      lifecycle.reset_self_heal().await.context("failed to reset self-heal flag")?;
      tracing::info!("automatic repair re-enabled for the next launch");
    }
    Command::Uid { .. } => {}
  }

  lifecycle.close().await.context("failed to close content store")?;
  Ok(())
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("FOLIO").separator("__"))
    .set_override_option(
      "data_dir",
      cli.data_dir.as_ref().map(|p| p.display().to_string()),
    )?
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise Settings")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn parse_position(s: &str) -> Result<Position, String> {
  let s = s.trim();
  if s.is_empty() || s == "null" {
    return Ok(Position::Missing);
  }
  if let Ok(n) = s.parse::<i64>() {
    return Ok(Position::Index(n));
  }
  s.parse::<f64>()
    .map(Position::from_real)
    .map_err(|_| format!("invalid position {s:?}"))
}

/// `TITLE:POS`, split at the last colon so titles may contain one.
fn parse_ancestor(s: &str) -> Result<Ancestor, String> {
  let (title, position) = s
    .rsplit_once(':')
    .ok_or_else(|| format!("expected TITLE:POS, got {s:?}"))?;
  Ok(Ancestor { title: title.to_owned(), position: parse_position(position)? })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ancestor_splits_at_last_colon() {
    let a = parse_ancestor("Mektup: Birinci:3").unwrap();
    assert_eq!(a.title, "Mektup: Birinci");
    assert_eq!(a.position, Position::Index(3));
  }

  #[test]
  fn positions() {
    assert_eq!(parse_position("null").unwrap(), Position::Missing);
    assert_eq!(parse_position("4.0").unwrap(), Position::Index(4));
    assert_eq!(parse_position("2.5").unwrap(), Position::Fractional(2.5));
    assert!(parse_position("x").is_err());
  }

  #[test]
  fn uid_command_matches_stored_identifiers() {
    let cli = Cli::try_parse_from([
      "folio",
      "uid",
      "--title",
      "İkinci Makam",
      "--position",
      "2",
      "--ancestor",
      "Onuncu Söz:10",
      "--ancestor",
      "Birinci Makam:1",
    ])
    .unwrap();
    let Command::Uid { title, position, ancestors } = cli.command else {
      panic!("expected uid");
    };
    assert_eq!(SectionSeed::new(&title, position, &ancestors).uid(), "s-1bbe568ced94");
  }
}
