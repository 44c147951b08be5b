use super::{CliCommand, CliError, commands};
use std::path::Path;

/// Executable names that stand for one subcommand, e.g. a `mdscatter-worker`
/// link starts a worker.
const PROGRAM_ALIASES: [(&str, &str); 2] = [("mdscatter-worker", "worker"), ("mdscatter-run", "run")];

pub(super) fn command_alias_from_program_name(program_name: &str) -> Option<&'static str> {
    let executable_name = Path::new(program_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program_name);
    let normalized = executable_name
        .strip_suffix(".exe")
        .unwrap_or(executable_name);

    PROGRAM_ALIASES
        .iter()
        .find(|(program, _)| *program == normalized)
        .map(|(_, command)| *command)
}

pub(super) fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Atom(args) => commands::run_atom_command(args),
        CliCommand::Jobs(args) => commands::run_jobs_command(args),
        CliCommand::Info(args) => commands::run_info_command(args),
        CliCommand::Run(args) => commands::run_run_command(args),
        CliCommand::Check(args) => commands::run_check_command(args),
        CliCommand::Save(args) => commands::run_save_command(args),
        CliCommand::Template(args) => commands::run_template_command(args),
        CliCommand::Worker(args) => commands::run_worker_command(args),
        CliCommand::Convert(args) => commands::run_convert_command(args),
    }
}
