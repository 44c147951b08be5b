mod commands;
mod dispatch;
mod helpers;

use clap::Parser;
use dispatch::command_alias_from_program_name;
use mdscatter_core::domain::AnalysisError;

pub fn run_from_env() -> i32 {
    let mut args = std::env::args();
    let program_name = args.next().unwrap_or_else(|| "mdscatter".to_string());
    let remaining: Vec<String> = args.collect();

    match run_with_program_name(&program_name, remaining) {
        Ok(code) => code,
        Err(error) => {
            let analysis_error = error.as_analysis_error();
            eprintln!("{}", analysis_error.diagnostic_line());
            analysis_error.exit_code()
        }
    }
}

#[cfg(test)]
fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("mdscatter".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn run_with_program_name(program_name: &str, args: Vec<String>) -> Result<i32, CliError> {
    let alias = command_alias_from_program_name(program_name);
    let full_args = std::iter::once("mdscatter".to_string())
        .chain(alias.map(str::to_string))
        .chain(args)
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            helpers::init_tracing(cli.verbose);
            dispatch::dispatch_parsed(cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(name = "mdscatter", version, about = "Molecular-dynamics trajectory analysis for neutron scattering")]
struct Cli {
    /// Log debug events (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Show the atom database entry of an element or isotope
    Atom(commands::AtomArgs),
    /// List registered jobs, or the settings of one job
    Jobs(commands::JobsArgs),
    /// Print the chemical summary of a trajectory
    Info(commands::InfoArgs),
    /// Run a job by name or from a saved job document
    Run(commands::RunArgs),
    /// Resolve the settings of a job without running it
    Check(commands::JobArgs),
    /// Save a runnable job document
    Save(commands::SaveArgs),
    /// Save a job document with every setting at its default
    Template(commands::TemplateArgs),
    /// Serve job steps to remote coordinators
    Worker(commands::WorkerArgs),
    /// Convert an extended XYZ file into a trajectory file
    Convert(commands::ConvertArgs),
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_analysis_error(&self) -> AnalysisError {
        match self {
            Self::Usage(message) => {
                let first = message.lines().next().unwrap_or_default();
                AnalysisError::job("INPUT.CLI_USAGE", first.trim_start_matches("error: ").to_string())
            }
            Self::Analysis(error) => error.clone(),
            Self::Internal(error) => AnalysisError::io("IO.CLI", format!("{error:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CliError, run};
    use mdscatter_core::domain::AnalysisError;

    #[test]
    fn usage_errors_map_to_input_validation() {
        let error = run(["frobnicate"]).expect_err("unknown command");
        assert!(matches!(error, CliError::Usage(_)));
        assert_eq!(error.as_analysis_error().exit_code(), 2);
    }

    #[test]
    fn internal_errors_keep_their_context_chain() {
        let error = CliError::from(anyhow::anyhow!("disk full").context("writing template"));
        let diagnostic = error.as_analysis_error().diagnostic_line();
        assert_eq!(diagnostic, "ERROR: [IO.CLI] writing template: disk full");
        assert_eq!(CliError::from(AnalysisError::unknown_atom("Xx")).as_analysis_error().exit_code(), 2);
    }

    #[test]
    fn help_is_not_an_error() {
        assert_eq!(run(["--help"]).expect("help"), 0);
    }
}
