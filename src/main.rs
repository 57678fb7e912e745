use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use manifest_harvester::{
    Endpoint, HarvestContext, HarvesterConfig, Migration, MigrationPlan, ObjectKind, Scope,
};

/// Copy Kubernetes objects between namespaces and clusters as clean manifests.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long, global = true, env = "MANIFEST_HARVESTER_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of objects fetched at the same time
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// kubectl binary to run
    #[arg(long, global = true)]
    kubectl: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write sanitized manifests of every object of a kind into a directory
    ///
    /// Example: manifest-harvester copy secrets -n lion
    Copy {
        /// secrets, configmaps or deployments
        kind: ObjectKind,

        /// Namespace to read from
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Kubeconfig context to read from
        #[arg(long)]
        context: Option<String>,

        /// Output directory (default: ~/<namespace>-<kind>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print a JSON report instead of the directory
        #[arg(long)]
        json: bool,
    },
    /// Copy objects from one namespace into another, optionally across clusters
    Migrate {
        /// Namespace to read from
        #[arg(long)]
        from: String,

        /// Namespace to apply into
        #[arg(long)]
        to: String,

        /// Configured cluster to read from
        #[arg(long)]
        from_cluster: Option<String>,

        /// Configured cluster to apply into
        #[arg(long)]
        to_cluster: Option<String>,

        #[arg(long, default_value = "secrets")]
        kind: ObjectKind,

        /// Work directory, absent or empty (default: ~/<from>-<kind>-migration)
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Keep the intermediate manifests after applying
        #[arg(long)]
        keep_manifests: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<HarvesterConfig> {
    let mut config = HarvesterConfig::load(cli.config.as_deref())
        .context("Unable to load configuration")?;
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(kubectl) = &cli.kubectl {
        config.kubectl.binary = kubectl.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let tool = Arc::new(config.kubectl());
    let pipeline = config.pipeline(tool);

    match cli.command {
        Command::Copy {
            kind,
            namespace,
            context,
            output,
            json,
        } => {
            let output_dir = output.unwrap_or_else(|| {
                HarvestContext::default_output_dir(&config.output_root(), &namespace, kind)
            });
            let mut scope = Scope::namespace(namespace);
            if let Some(context) = context {
                scope = scope.with_context(context);
            }

            let result = pipeline
                .execute(HarvestContext::new(scope, kind, output_dir))
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                info!("Manifests successfully created in {}", result.output_dir.display());
                println!("{}", result.output_dir.display());
                eprintln!(
                    "Execute `kubectl apply -f {}` in your desired namespace",
                    result.output_dir.display()
                );
            }
        }
        Command::Migrate {
            from,
            to,
            from_cluster,
            to_cluster,
            kind,
            work_dir,
            keep_manifests,
        } => {
            let mut source = Endpoint::new(Scope::namespace(&from));
            if let Some(name) = from_cluster {
                source = source.on_cluster(config.cluster(&name)?);
            }
            let mut target = Endpoint::new(Scope::namespace(&to));
            if let Some(name) = to_cluster {
                target = target.on_cluster(config.cluster(&name)?);
            }

            let plan = MigrationPlan {
                kind,
                source,
                target,
                work_dir: work_dir.unwrap_or_else(|| {
                    config
                        .output_root()
                        .join(format!("{}-{}-migration", from, kind.resource()))
                }),
                keep_manifests,
            };

            let report = Migration::new(pipeline).run(plan).await?;

            println!("{} available in {}:", kind, to);
            for name in &report.target_objects {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
