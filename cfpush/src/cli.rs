/// # cfpush CLI Interface (Module)
///
/// Command parsing and the async [`run`] entrypoint. Everything beyond argument plumbing and
/// printing lives in `cfpush-core`.
///
/// ## How To Use
/// - From a shell: `cfpush --config cf.yaml push --app-guid <guid> --path ./my-app`
/// - From tests: build a [`Cli`] and `await` [`run`].
///
/// Results go to stdout one per line; tracing goes to stderr.
use crate::load_config::load_config;
use anyhow::Result;
use cfpush_core::bits::ApplicationBits;
use cfpush_core::config::Config;
use cfpush_core::gateway::CloudControllerGateway;
use cfpush_core::pagination::PageStream;
use cfpush_core::repositories::{RouteRepository, ServiceRepository, SpaceRepository};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for cfpush: push application bits and browse a Cloud Controller.
#[derive(Parser)]
#[clap(
    name = "cfpush",
    version,
    about = "Push application bits to a Cloud Controller and list spaces, routes and services"
)]
pub struct Cli {
    /// Path to the YAML config file
    #[clap(long, global = true, default_value = "cfpush.yaml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a directory or zip archive as the bits of an existing app
    Push {
        #[clap(long)]
        app_guid: String,
        /// Application directory or zip archive
        #[clap(long)]
        path: PathBuf,
    },
    /// List the spaces of an organization
    Spaces {
        #[clap(long)]
        org_guid: String,
    },
    /// List routes, or look up the first route with a host
    Routes {
        #[clap(long)]
        host: Option<String>,
    },
    /// List the service instances of a space
    Services {
        #[clap(long)]
        space_guid: String,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let config = load_config(&cli.config)?;
    let gateway = Arc::new(CloudControllerGateway::new(&config)?);

    match cli.command {
        Commands::Push { app_guid, path } => push(gateway, config, &app_guid, path).await,
        Commands::Spaces { org_guid } => {
            let repo = SpaceRepository::new(gateway, config);
            let count = print_lines(repo.list_spaces(&org_guid), |s| {
                format!("{}\t{}", s.name, s.guid)
            })
            .await?;
            tracing::info!(command = "spaces", count, "Listing complete");
            Ok(())
        }
        Commands::Routes { host: Some(host) } => {
            let repo = RouteRepository::new(gateway, config);
            let route = repo.find_by_host(&host).await?;
            println!("{}\t{}", route.url(), route.guid);
            Ok(())
        }
        Commands::Routes { host: None } => {
            let repo = RouteRepository::new(gateway, config);
            let count =
                print_lines(repo.list_routes(), |r| format!("{}\t{}", r.url(), r.guid)).await?;
            tracing::info!(command = "routes", count, "Listing complete");
            Ok(())
        }
        Commands::Services { space_guid } => {
            let repo = ServiceRepository::new(gateway, config);
            let count = print_lines(repo.list_service_instances(&space_guid), |s| {
                let plan = if s.plan.is_empty() {
                    "user-provided"
                } else {
                    s.plan.as_str()
                };
                format!("{}\t{}\t{}", s.name, plan, s.guid)
            })
            .await?;
            tracing::info!(command = "services", count, "Listing complete");
            Ok(())
        }
    }
}

async fn push(
    gateway: Arc<CloudControllerGateway>,
    config: Config,
    app_guid: &str,
    path: PathBuf,
) -> Result<()> {
    tracing::info!(command = "push", app_guid, path = %path.display(), "Starting push");
    let bits = ApplicationBits::new(gateway, config);
    let result = bits
        .upload_app(app_guid, &path, |resolved, size, count| {
            println!(
                "Uploading {} ({} bytes, {} files)",
                resolved.display(),
                size,
                count
            );
        })
        .await;

    match result {
        Ok(()) => {
            println!("Push of {app_guid} complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "push", error = %e, "Push failed");
            Err(anyhow::Error::new(e).context(format!("Push of app {app_guid} failed")))
        }
    }
}

/// Prints each item as soon as its page arrives.
async fn print_lines<T, F>(mut stream: PageStream<T>, line: F) -> Result<usize>
where
    F: Fn(&T) -> String,
{
    let mut count = 0;
    while let Some(batch) = stream.next_batch().await {
        for item in &batch {
            println!("{}", line(item));
        }
        count += batch.len();
    }
    stream.finish().await?;
    Ok(count)
}
