use anyhow::Context;
use clap::{CommandFactory, Parser};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use smwmerge_core::config::Settings;
use smwmerge_core::driver::merge_texts;
use smwmerge_core::io::{encode_output, read_smw_file};
use smwmerge_core::logging::{env_filter, init_logging, LogLevel};
use smwmerge_core::strategy::{ConflictReporter, LogReporter};
use smwmerge_engine::Conflict;

/// Merge finished with conflicts left for manual follow-up.
const EXIT_CONFLICT: u8 = 1;
/// Unreadable input or configuration.
const EXIT_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(
    name = "smwmerge",
    version,
    about = "Three-way merge for SIMPL Windows program files",
    long_about = "Three-way merge for SIMPL Windows program files.\n\n\
        Takes your copy, their copy and the original both were made from, and \
        writes a program that carries both sets of changes. Exits with 1 if \
        conflicts were left for manual follow-up."
)]
struct Cli {
    /// Your modified program
    your_file: Option<PathBuf>,

    /// Their modified program
    their_file: Option<PathBuf>,

    /// The original both were derived from
    original_file: Option<PathBuf>,

    /// Write the result to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// Logging level: critical, error, warning, info or debug
    #[arg(short, long, value_name = "LEVEL")]
    logging_level: Option<LogLevel>,

    /// Write log messages to FILE instead of stderr
    #[arg(short = 'f', long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// JSON settings file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

struct Inputs<'a> {
    yours: &'a Path,
    theirs: &'a Path,
    original: &'a Path,
}

impl Cli {
    fn inputs(&self) -> Option<Inputs<'_>> {
        Some(Inputs {
            yours: self.your_file.as_deref()?,
            theirs: self.their_file.as_deref()?,
            original: self.original_file.as_deref()?,
        })
    }
}

/// Logs structural conflicts and tells the user on stderr.
struct StderrReporter;

impl ConflictReporter for StderrReporter {
    fn unhandled_conflict(&self, conflict: &Conflict) {
        LogReporter.unhandled_conflict(conflict);
        eprintln!(
            "SMW merge error: unhandled merge conflict in the symbol library. \
             Resulting program will be incomplete."
        );
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(inputs) = cli.inputs() else {
        if let Err(e) = Cli::command().print_help() {
            eprintln!("Error: {e}");
        }
        return ExitCode::SUCCESS;
    };

    let settings = match &cli.config {
        Some(path) => match Settings::load(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::from(EXIT_FAILURE);
            }
        },
        None => Settings::default(),
    };

    let log_file = cli.log_file.as_deref().or(settings.logging.file.as_deref());
    let _guard = match init_logging(env_filter(cli.logging_level, settings.logging.level), log_file)
    {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {e:#}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match run(&inputs, cli.output_file.as_deref(), &settings) {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(EXIT_CONFLICT),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Merge the inputs and write the result. Returns whether conflicts remain.
fn run(inputs: &Inputs<'_>, output: Option<&Path>, settings: &Settings) -> anyhow::Result<bool> {
    let yours = read_smw_file(inputs.yours)?;
    let theirs = read_smw_file(inputs.theirs)?;
    let original = read_smw_file(inputs.original)?;

    let report = merge_texts(&yours, &theirs, &original, settings, &StderrReporter)
        .context("invalid input program")?;

    let bytes = encode_output(&report.output);
    match output {
        Some(path) => std::fs::write(path, &bytes)
            .with_context(|| format!("failed to write '{}'", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }

    tracing::info!(
        conflicted = report.conflicted,
        dangling = report.dangling,
        "wrote merged program"
    );
    if report.conflicted {
        eprintln!("Merge finished with conflicts; review the result before use.");
    }
    Ok(report.conflicted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "[\r\nObjTp=Hd\r\nNm=Program\r\n]\r\n";

    #[test]
    fn test_missing_inputs_means_usage() {
        let cli = Cli::try_parse_from(["smwmerge", "mine.smw"]).unwrap();
        assert!(cli.inputs().is_none());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "smwmerge", "-o", "out.smw", "-l", "debug", "-f", "merge.log", "a.smw", "b.smw",
            "x.smw",
        ])
        .unwrap();
        assert!(cli.inputs().is_some());
        assert_eq!(cli.logging_level, Some(LogLevel::Debug));
        assert_eq!(cli.output_file.as_deref(), Some(Path::new("out.smw")));
        assert!(Cli::try_parse_from(["smwmerge", "-l", "loud"]).is_err());
    }

    #[test]
    fn test_run_writes_merged_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name);
        for name in ["a.smw", "b.smw", "x.smw"] {
            std::fs::write(path(name), HEADER).unwrap();
        }

        let (a, b, x, out) = (path("a.smw"), path("b.smw"), path("x.smw"), path("out.smw"));
        let inputs = Inputs {
            yours: &a,
            theirs: &b,
            original: &x,
        };
        let conflicted = run(&inputs, Some(&out), &Settings::default()).unwrap();
        assert!(!conflicted);
        assert_eq!(std::fs::read(&out).unwrap(), HEADER.as_bytes());
    }

    #[test]
    fn test_run_rejects_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("x.smw");
        std::fs::write(&present, HEADER).unwrap();
        let missing = dir.path().join("missing.smw");

        let inputs = Inputs {
            yours: &missing,
            theirs: &present,
            original: &present,
        };
        let err = run(&inputs, None, &Settings::default()).unwrap_err();
        assert!(err.to_string().contains("can't open file"));
    }
}
