use super::CliError;
use super::helpers::*;
use anyhow::Context;
use mdscatter_core::domain::AnalysisError;
use mdscatter_core::jobs::{
    CancellationToken, DocumentOutcome, JobDocument, JobRunner, JobState, JobStatus, serve,
};
use mdscatter_core::trajectory::{Compression, Converter, ConverterOptions, Trajectory, XyzConverter};
use std::net::TcpListener;
use std::path::PathBuf;

#[derive(clap::Args)]
pub(super) struct AtomArgs {
    /// Element or isotope symbol, e.g. `H` or `2H`
    symbol: String,

    /// Print the entry as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
pub(super) struct JobsArgs {
    /// Show the settings of this job instead of the job list
    name: Option<String>,
}

#[derive(clap::Args)]
pub(super) struct InfoArgs {
    /// Trajectory file
    trajectory: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct JobArgs {
    /// Registered job name
    job: String,

    /// Parameters as an inline JSON object
    #[arg(long, conflicts_with = "parameters_file")]
    parameters: Option<String>,

    /// Parameters read from a JSON file
    #[arg(long)]
    parameters_file: Option<PathBuf>,
}

#[derive(clap::Args)]
#[command(group(clap::ArgGroup::new("source").required(true).args(["job", "file"])))]
pub(super) struct RunArgs {
    /// Registered job name
    job: Option<String>,

    /// Saved job document to run
    #[arg(long, conflicts_with_all = ["job", "parameters", "parameters_file"])]
    file: Option<PathBuf>,

    /// Parameters as an inline JSON object
    #[arg(long, conflicts_with = "parameters_file")]
    parameters: Option<String>,

    /// Parameters read from a JSON file
    #[arg(long)]
    parameters_file: Option<PathBuf>,

    /// Run single-core and multicore and compare the outputs
    #[arg(long)]
    check_parallel: bool,
}

#[derive(clap::Args)]
pub(super) struct SaveArgs {
    #[command(flatten)]
    job: JobArgs,

    /// Document path
    #[arg(long, short)]
    output: PathBuf,

    /// Make the document compare single-core and multicore runs
    #[arg(long)]
    check_parallel: bool,
}

#[derive(clap::Args)]
pub(super) struct TemplateArgs {
    /// Registered job name
    job: String,

    /// Document path
    output: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct WorkerArgs {
    /// Address to accept coordinators on
    #[arg(long, default_value = "127.0.0.1:7070")]
    listen: String,

    /// Exit after serving this many sessions
    #[arg(long)]
    sessions: Option<usize>,
}

#[derive(clap::Args)]
pub(super) struct ConvertArgs {
    /// Extended XYZ input
    input: PathBuf,

    /// Trajectory file to write
    output: PathBuf,

    /// ps between frames when the input carries no times
    #[arg(long, default_value_t = 1.0)]
    time_step: f64,

    /// Length unit of positions and cell in the input
    #[arg(long, default_value = "ang")]
    length_unit: String,

    /// none, gzip or lzf
    #[arg(long, default_value = "none")]
    compression: String,
}

pub(super) fn run_atom_command(args: AtomArgs) -> Result<i32, CliError> {
    let databases = load_databases()?;
    let entry = databases.atoms.get(&args.symbol)?;
    if args.json {
        let rendered = serde_json::to_string_pretty(entry).context("failed to render atom entry")?;
        println!("{rendered}");
    } else {
        println!("{}", render_atom_entry(entry));
    }
    Ok(0)
}

pub(super) fn run_jobs_command(args: JobsArgs) -> Result<i32, CliError> {
    let registry = load_registry()?;
    match args.name {
        Some(name) => println!("{}", registry.get(&name)?.describe()),
        None => {
            for descriptor in registry.iter() {
                println!("{:<34} {}", descriptor.name, descriptor.category.join(" > "));
            }
        }
    }
    Ok(0)
}

pub(super) fn run_info_command(args: InfoArgs) -> Result<i32, CliError> {
    let databases = load_databases()?;
    let trajectory = Trajectory::open(&args.trajectory, &databases)?;
    println!("{}", trajectory.chemical_system().summary());
    println!("frames: {}", trajectory.len());
    println!("time step: {} ps", trajectory.md_time_step());
    println!("periodic: {}", trajectory.is_periodic());
    println!("variables: {}", trajectory.variable_names().join(", "));
    Ok(0)
}

pub(super) fn run_check_command(args: JobArgs) -> Result<i32, CliError> {
    let (registry, databases) = (load_registry()?, load_databases()?);
    let descriptor = registry.get(&args.job)?;
    let parameters = load_parameters(args.parameters.as_deref(), args.parameters_file.as_deref())?;
    let config = JobRunner::new(descriptor, &databases).check(&parameters)?;
    println!("{}", config.information());
    Ok(0)
}

pub(super) fn run_run_command(args: RunArgs) -> Result<i32, CliError> {
    let (registry, databases) = (load_registry()?, load_databases()?);
    let document = match (args.file, args.job) {
        (Some(path), _) => JobDocument::load(&path)?,
        (None, Some(job)) => {
            let parameters = load_parameters(args.parameters.as_deref(), args.parameters_file.as_deref())?;
            JobDocument::new(&job, parameters)
        }
        (None, None) => {
            return Err(CliError::Usage("either a job name or --file is required".to_string()));
        }
    };
    let document = if args.check_parallel { document.parallel_check() } else { document };

    let mut status = JobStatus::new(CancellationToken::new());
    match document.run(&registry, &databases, &mut status)? {
        DocumentOutcome::Run(report) => {
            println!("{}", render_report(&report));
            if report.state == JobState::Aborted { Ok(1) } else { Ok(0) }
        }
        DocumentOutcome::ParallelCheck(check) => {
            println!(
                "single-core and multicore outputs agree: {} variables, {} values",
                check.variables, check.values
            );
            Ok(0)
        }
    }
}

pub(super) fn run_save_command(args: SaveArgs) -> Result<i32, CliError> {
    let registry = load_registry()?;
    let descriptor = registry.get(&args.job.job)?;
    let parameters = load_parameters(args.job.parameters.as_deref(), args.job.parameters_file.as_deref())?;
    let document = JobDocument::new(descriptor.name, parameters);
    let document = if args.check_parallel { document.parallel_check() } else { document };
    document.save(&args.output)?;
    println!("saved {} to {}", descriptor.name, args.output.display());
    Ok(0)
}

pub(super) fn run_template_command(args: TemplateArgs) -> Result<i32, CliError> {
    let registry = load_registry()?;
    let descriptor = registry.get(&args.job)?;
    JobDocument::template(descriptor).save(&args.output)?;
    println!("saved {} template to {}", descriptor.name, args.output.display());
    Ok(0)
}

pub(super) fn run_worker_command(args: WorkerArgs) -> Result<i32, CliError> {
    let (registry, databases) = (load_registry()?, load_databases()?);
    let listener = TcpListener::bind(&args.listen).map_err(|error| {
        AnalysisError::io("IO.WORKER_BIND", format!("cannot listen on {}: {error}", args.listen))
    })?;
    tracing::info!(address = %args.listen, sessions = ?args.sessions, "worker listening");
    serve(&listener, &registry, &databases, args.sessions, &CancellationToken::new())?;
    Ok(0)
}

pub(super) fn run_convert_command(args: ConvertArgs) -> Result<i32, CliError> {
    let databases = load_databases()?;
    let compression = Compression::parse(&args.compression)
        .map_err(|error| AnalysisError::job("INPUT.CLI_COMPRESSION", error.to_string()))?;
    let options = ConverterOptions {
        time_step: args.time_step,
        length_unit: args.length_unit,
        compression,
        ..ConverterOptions::default()
    };
    let converter = XyzConverter;
    let summary = converter.convert(&args.input, &args.output, &options, &databases)?;
    println!(
        "{}: wrote {} frames of {} atoms to {}",
        converter.name(),
        summary.n_frames,
        summary.n_atoms,
        summary.output.display()
    );
    Ok(0)
}
