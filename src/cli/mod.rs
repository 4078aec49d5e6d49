//! Command-line interface.

use clap::Parser;
use std::path::PathBuf;

use crate::domain::errors::ExperimentError;

/// Memory-budget sweep runner for desktop and browser workloads.
#[derive(Debug, Parser)]
#[command(name = "memsweep", version, about)]
pub struct Cli {
    /// Root directory the run writes its artifact tree into
    pub output_directory: PathBuf,

    /// Configuration file (defaults to memsweep.yaml in the working
    /// directory, merged with MEMSWEEP_* environment variables)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the number of samples per memory level
    #[arg(short, long)]
    pub samples: Option<usize>,

    /// Only sweep the named workload (may be repeated)
    #[arg(short, long = "workload")]
    pub workloads: Vec<String>,
}

/// Map a run failure to a process exit, printing it for the operator.
pub fn handle_error(err: anyhow::Error) -> ! {
    let code = match err.downcast_ref::<ExperimentError>() {
        // Operator interrupt: clean teardown already ran, conventional
        // 128+SIGINT exit code.
        Some(ExperimentError::Interrupted) => {
            eprintln!("interrupted");
            130
        }
        _ => {
            eprintln!("error: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_directory() {
        let cli = Cli::try_parse_from(vec!["memsweep", "/tmp/out"]).unwrap();
        assert_eq!(cli.output_directory, PathBuf::from("/tmp/out"));
        assert!(cli.config.is_none());
        assert!(cli.workloads.is_empty());
    }

    #[test]
    fn test_missing_output_directory_is_an_error() {
        assert!(Cli::try_parse_from(vec!["memsweep"]).is_err());
    }

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::try_parse_from(vec![
            "memsweep",
            "/tmp/out",
            "--config",
            "alt.yaml",
            "--samples",
            "3",
            "--workload",
            "mail_native",
            "--workload",
            "chat_native",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.yaml")));
        assert_eq!(cli.samples, Some(3));
        assert_eq!(cli.workloads, vec!["mail_native", "chat_native"]);
    }
}
