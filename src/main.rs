use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use sqldom::ast::{DynamicFilterId, PlaceholderId, VariantKey};
use sqldom::config::Settings;
use sqldom::db::{probe_server, ConnectionConfig};
use sqldom::driver::{ConnectionInfo, Dialect, DriverFactory, ServerVersion};
use sqldom::plan::PlanDocument;
use sqldom::postcompile::{SqlPostCompilerConfiguration, TypeIdMap};

/// Compile relational query plans to dialect specific SQL
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (default: <config dir>/sqldom/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the command text of a JSON plan document
    Compile(CompileArgs),
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Plan document (JSON)
    plan: PathBuf,

    /// Target dialect: postgresql, sqlserver or oracle
    #[arg(long, conflicts_with = "connect")]
    dialect: Option<String>,

    /// Target server version, e.g. 8.3 or 11.0
    #[arg(long, conflicts_with = "connect")]
    server_version: Option<String>,

    /// Read the version from a saved PostgreSQL connection
    #[arg(long)]
    connect: Option<String>,

    /// Placeholder value, NAME=VALUE
    #[arg(long = "bind", value_name = "NAME=VALUE")]
    binds: Vec<String>,

    /// Render a parameter as NULL (selects the IS NULL branch)
    #[arg(long = "null", value_name = "PARAMETER")]
    nulls: Vec<String>,

    /// Type discriminator, TYPE=ID
    #[arg(long = "type-id", value_name = "TYPE=ID")]
    type_ids: Vec<String>,

    /// Dynamic filter rows, ID=ROW[;ROW...] with comma separated values
    #[arg(long = "rows", value_name = "ID=ROWS")]
    rows: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let level = settings.log_level.as_deref().unwrap_or("warn");
    let level = tracing::Level::from_str(level)
        .with_context(|| format!("Invalid log level {level:?}"))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Compile(args) => compile(&settings, args).await,
    }
}

async fn compile(settings: &Settings, args: CompileArgs) -> Result<()> {
    let info = resolve_target(settings, &args).await?;
    let driver = DriverFactory::create(&info)?;

    let text = std::fs::read_to_string(&args.plan)
        .with_context(|| format!("Failed to read plan {}", args.plan.display()))?;
    let plan = PlanDocument::from_json(&text)?.build()?;
    let result = driver.compile(&plan.provider)?;

    let mut config = SqlPostCompilerConfiguration::new();
    for bind in &args.binds {
        let (name, value) = split_pair(bind)?;
        config = config.bind_placeholder(PlaceholderId::Key(name.to_string()), value);
    }
    for name in &args.nulls {
        let Some(parameter) = plan.parameter(name) else {
            bail!("Plan has no parameter named {name:?}");
        };
        config = config.select_alternative(VariantKey::NullParameter(parameter.clone()));
    }
    if !args.type_ids.is_empty() {
        let mut types = TypeIdMap::new();
        for entry in &args.type_ids {
            let (name, id) = split_pair(entry)?;
            let id: i32 = id
                .parse()
                .with_context(|| format!("Invalid type id in {entry:?}"))?;
            types = types.register(name, id);
        }
        config = config.with_type_registry(Arc::new(types));
    }
    for entry in &args.rows {
        let (id, rows) = split_pair(entry)?;
        let rows = rows
            .split(';')
            .filter(|r| !r.is_empty())
            .map(|r| r.split(',').map(str::to_string).collect())
            .collect();
        config = config.bind_dynamic_filter(DynamicFilterId(id.to_string()), rows);
    }

    println!("{}", result.command_text_with(&config)?);
    for parameter in result.parameters() {
        eprintln!("-- {} => {}", parameter.hint(), result.parameter_name(parameter)?);
    }
    Ok(())
}

async fn resolve_target(settings: &Settings, args: &CompileArgs) -> Result<ConnectionInfo> {
    if let Some(name) = &args.connect {
        let Some(conn) = settings.connection(name) else {
            let known: Vec<&str> = settings.connections.iter().map(|c| c.name.as_str()).collect();
            bail!("No saved connection named {name:?} (known: {})", known.join(", "));
        };
        let conn: ConnectionConfig = conn.clone().with_env_password();
        return probe_server(&conn).await;
    }

    let dialect = match (&args.dialect, settings.dialect) {
        (Some(name), _) => Dialect::from_str(name)?,
        (None, Some(dialect)) => dialect,
        (None, None) => bail!("Pass --dialect or --connect, or set `dialect` in the config file"),
    };
    let version = match args
        .server_version
        .as_deref()
        .or(settings.server_version.as_deref())
    {
        Some(v) => ServerVersion::from_str(v)?,
        None => dialect.min_version(),
    };
    Ok(ConnectionInfo::new(dialect, version))
}

fn split_pair(entry: &str) -> Result<(&str, &str)> {
    match entry.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => bail!("Expected NAME=VALUE, got {entry:?}"),
    }
}
