//! ```sh
//! STOWAGE_CLIENT_AUTH_TOKEN=x cargo r -p stowage-client -F binary -- 'http://localhost:8080' upload my-charm data ./data.zip
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use stowage_api_types::params::PublishRequest;
use stowage_api_types::resource::{Channel, PackageDeclaration, PackageId, Revision};
use stowage_client::Client;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Resource store http URL (`http://resources.example.com`)
    store_url: String,
    #[arg(env = "STOWAGE_CLIENT_AUTH_TOKEN")]
    auth_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Register {
        username: String,
    },
    /// Declare a package from a JSON file with `kind`, `public` and `resources`
    Declare {
        package: PackageId,
        declaration: PathBuf,
    },
    Upload {
        package: PackageId,
        name: String,
        file: PathBuf,
    },
    Download {
        package: PackageId,
        name: String,
        #[arg(long)]
        revision: Option<Revision>,
        #[arg(long)]
        channel: Option<String>,
        /// Defaults to stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    List {
        package: PackageId,
        #[arg(long)]
        channel: Option<String>,
    },
    /// Publish `name=revision` pairs to one or more channels
    Publish {
        package: PackageId,
        #[arg(long = "channel", required = true)]
        channels: Vec<Channel>,
        #[arg(value_parser = parse_assignment, required = true)]
        resources: Vec<(String, Revision)>,
    },
}

fn parse_assignment(arg: &str) -> Result<(String, Revision), String> {
    let (name, revision) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=revision, got {arg:?}"))?;
    let revision = revision
        .parse()
        .map_err(|_| format!("invalid revision in {arg:?}"))?;
    Ok((name.to_owned(), revision))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut client = Client::new(&args.store_url, args.auth_token);

    match args.command {
        Commands::Register { username } => {
            client.register(&username).await?;
            println!("{}", client.token().unwrap_or_default());
        }
        Commands::Declare {
            package,
            declaration,
        } => {
            let declaration: PackageDeclaration = serde_json::from_slice(
                &std::fs::read(&declaration)
                    .with_context(|| format!("reading {}", declaration.display()))?,
            )?;
            client.declare(&package, &declaration).await?;
        }
        Commands::Upload {
            package,
            name,
            file,
        } => {
            let content =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let revision = client.upload(&package, &name, content).await?;
            println!("{name}/{revision}");
        }
        Commands::Download {
            package,
            name,
            revision,
            channel,
            output,
        } => {
            let content = client
                .download(&package, &name, revision, channel.as_deref())
                .await?;
            match output {
                Some(path) => std::fs::write(&path, content)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => std::io::stdout().write_all(&content)?,
            }
        }
        Commands::List { package, channel } => {
            for resource in client.list(&package, channel.as_deref()).await? {
                println!("{resource:?}");
            }
        }
        Commands::Publish {
            package,
            channels,
            resources,
        } => {
            let request = PublishRequest {
                channels,
                resources: resources.into_iter().collect::<BTreeMap<_, _>>(),
            };
            client.publish(&package, &request).await?;
        }
    }

    Ok(())
}
