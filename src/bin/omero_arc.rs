use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use omero_arc::app::{self, App, PackRequest};
use omero_arc::commander::{ARC_TOOL, SystemArcCommander};
use omero_arc::config::{self, ConfigLoader, ImageFileMapping, ResolvedConfig};
use omero_arc::domain::ObjectRef;
use omero_arc::error::ArcError;
use omero_arc::omero::OmeroHttpClient;
use omero_arc::output::{JsonOutput, LogProgress};

#[derive(Parser)]
#[command(name = "omero-arc")]
#[command(about = "Pack OMERO projects into ARC repositories")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Pack a project into a new or existing ARC")]
    Pack(PackArgs),
    #[command(about = "Print the investigation and study commands for a project")]
    Commands(CommandsArgs),
}

#[derive(Args)]
struct PackArgs {
    /// Project reference, e.g. Project:51
    project: String,

    /// ARC directory to create, or an existing ARC to add to
    path: PathBuf,

    /// Root directory the mapped image paths are relative to
    #[arg(long)]
    images: Option<PathBuf>,

    /// JSON file mapping Image:<id> to a path under the image root
    #[arg(long)]
    mapping: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    arc_executable: Option<PathBuf>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct CommandsArgs {
    project: String,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<ArcError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ArcError) -> u8 {
    match error {
        ArcError::InvalidObjectRef(_)
        | ArcError::NotAProject(_)
        | ArcError::MissingImageMapping
        | ArcError::ConfigRead(_)
        | ArcError::ConfigParse(_)
        | ArcError::MissingCredentials(_)
        | ArcError::RepositoryExists(_)
        | ArcError::IdentifierCollision { .. } => 2,
        ArcError::OmeroHttp(_)
        | ArcError::OmeroStatus { .. }
        | ArcError::OmeroResponse(_)
        | ArcError::MissingTool(_)
        | ArcError::CommandSpawn { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Pack(args) => run_pack(args),
        Commands::Commands(args) => run_commands(args),
    }
}

fn run_pack(args: PackArgs) -> miette::Result<()> {
    let project: ObjectRef = args.project.parse()?;
    project.expect_project()?;
    let resolved = ConfigLoader::resolve(args.config.as_deref())?;

    let target = Utf8PathBuf::from_path_buf(args.path)
        .map_err(|path| ArcError::Filesystem(format!("non UTF-8 path: {}", path.display())))?;
    let images = load_image_mapping(&resolved, args.images, args.mapping, args.dry_run)?;

    let omero = connect(&resolved)?;
    let mut executable = args.arc_executable.or_else(|| resolved.arc_executable.clone());
    if args.dry_run && executable.is_none() {
        // Nothing is run; skip the PATH lookup.
        executable = Some(PathBuf::from(ARC_TOOL));
    }
    let commander = SystemArcCommander::new(executable)?;
    let app = App::new(omero, commander);

    let request = PackRequest {
        project,
        target,
        images,
    };
    if args.dry_run {
        let result = app.plan(request, &LogProgress)?;
        JsonOutput::print_plan(&result).into_diagnostic()?;
    } else {
        let result = app.pack(request, &LogProgress)?;
        JsonOutput::print_pack(&result).into_diagnostic()?;
    }
    Ok(())
}

fn run_commands(args: CommandsArgs) -> miette::Result<()> {
    let project: ObjectRef = args.project.parse()?;
    let resolved = ConfigLoader::resolve(args.config.as_deref())?;
    let omero = connect(&resolved)?;
    let result = app::mapper_commands(&omero, project)?;
    JsonOutput::print_commands(&result).into_diagnostic()?;
    Ok(())
}

fn connect(resolved: &ResolvedConfig) -> Result<OmeroHttpClient, ArcError> {
    let server = resolved.require_server()?;
    let password = config::password_from_env()?;
    OmeroHttpClient::connect(server, &password)
}

/// CLI flags win over the config file. A dry run needs no files.
fn load_image_mapping(
    resolved: &ResolvedConfig,
    images: Option<PathBuf>,
    mapping: Option<PathBuf>,
    dry_run: bool,
) -> Result<ImageFileMapping, ArcError> {
    let root = images
        .or_else(|| resolved.image_root.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    match mapping.or_else(|| resolved.image_mapping.clone()) {
        Some(file) => ImageFileMapping::load(root, &file),
        None if dry_run => Ok(ImageFileMapping::new(root)),
        None => Err(ArcError::MissingImageMapping),
    }
}
