//! wit-canon command line tool.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use wit_canon::config::Config;
use wit_canon::marshal::Direction;
use wit_canon::project::{Project, WorldFunction};
use wit_canon::report::{Report, TypeReport};
use wit_canon::{loader, subscriber};

#[derive(Parser)]
#[command(name = "wit-canon")]
#[command(about = "Resolve WIT packages and compute canonical ABI layouts and marshaling plans")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true, env = "WIT_CANON_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter directive, overriding the configuration (e.g. `wit_canon=debug`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Sources {
    /// Source directories, one package per directory. Defaults to the
    /// configured `sources`.
    dirs: Vec<PathBuf>,

    /// Extension of document files inside the source directories.
    #[arg(long)]
    extension: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the ABI report of every function in a world, or of every
    /// interface when no world is given
    Report {
        #[command(flatten)]
        sources: Sources,

        /// World to report, as `ns:pkg/world@version`
        #[arg(short, long)]
        world: Option<String>,
    },

    /// Print size, alignment and flattening of one type
    Layout {
        #[command(flatten)]
        sources: Sources,

        /// Qualified type, as `ns:pkg/iface.name@version`
        #[arg(short = 't', long = "type")]
        type_ref: String,
    },

    /// Print the lower/lift instruction plan of one world function
    Plan {
        #[command(flatten)]
        sources: Sources,

        /// World containing the function, as `ns:pkg/world@version`
        #[arg(short, long)]
        world: Option<String>,

        /// Function name, optionally prefixed by its module (`module#name`)
        #[arg(short, long)]
        function: String,

        /// Side of the boundary to plan for. Defaults to how the world
        /// uses the function.
        #[arg(short, long, value_enum)]
        direction: Option<DirectionArg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DirectionArg {
    /// Lower arguments, call the import, lift results
    Import,
    /// Lift arguments, call the implementation, lower results
    Export,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Import => Direction::Import,
            DirectionArg::Export => Direction::Export,
        }
    }
}

fn load(config: &Config, sources: Sources) -> anyhow::Result<Project> {
    let dirs = if sources.dirs.is_empty() {
        config.sources.clone()
    } else {
        sources.dirs
    };
    if dirs.is_empty() {
        bail!("No source directories given on the command line or in the configuration");
    }
    let extension = sources.extension.as_deref().unwrap_or(&config.extension);
    let project = loader::load_dirs(&dirs, extension).context("Failed to load sources")?;
    Ok(project)
}

fn find_function<'w>(
    functions: &'w [WorldFunction],
    wanted: &str,
) -> anyhow::Result<&'w WorldFunction> {
    let matches: Vec<&WorldFunction> = functions
        .iter()
        .filter(|f| {
            f.name == wanted
                || f
                    .module
                    .as_ref()
                    .is_some_and(|module| format!("{module}#{}", f.name) == wanted)
        })
        .collect();
    match matches.as_slice() {
        [found] => Ok(*found),
        [] => bail!("Function '{wanted}' not found in world"),
        many => {
            let candidates: Vec<String> = many
                .iter()
                .map(|f| format!("{}#{}", f.module.as_deref().unwrap_or("$root"), f.name))
                .collect();
            bail!(
                "Function '{wanted}' is ambiguous, use one of: {}",
                candidates.join(", ")
            )
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let mut logging = config.logging.clone();
    if let Some(level) = cli.log_level {
        logging.level = level;
    }
    subscriber::init(&logging)?;

    match cli.command {
        Commands::Report { sources, world } => {
            let project = load(&config, sources)?;
            let report = match world.or_else(|| config.world.clone()) {
                Some(world) => Report::for_world(&project, &world)
                    .with_context(|| format!("Failed to report world '{world}'"))?,
                None => Report::for_interfaces(&project)?,
            };
            tracing::info!(functions = report.functions.len(), "report ready");
            print_json(&report)
        }
        Commands::Layout { sources, type_ref } => {
            let project = load(&config, sources)?;
            let id = project.find_type(&type_ref)?;
            let layout = TypeReport::of(&project.abi(), id)
                .with_context(|| format!("Failed to lay out '{type_ref}'"))?;
            print_json(&layout)
        }
        Commands::Plan {
            sources,
            world,
            function,
            direction,
        } => {
            let project = load(&config, sources)?;
            let Some(world) = world.or_else(|| config.world.clone()) else {
                bail!("--world is required when no world is configured");
            };
            let functions = project.world_functions(&world)?;
            let found = find_function(&functions, &function)?;
            let direction = direction.map(Direction::from).unwrap_or(found.direction);
            let plan = project
                .abi()
                .plan(found.module.as_deref(), &found.name, found.func, direction)
                .with_context(|| format!("Failed to plan '{function}'"))?;
            print_json(&plan)
        }
    }
}
