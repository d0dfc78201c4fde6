use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;

use oxidescout_lib::commands::{self, AppState, CommandError};
use oxidescout_lib::config::ConfigStorage;
use oxidescout_lib::frontend::{serve_prompts, Frontend, TerminalFrontend};
use oxidescout_lib::sftp::TextContent;
use oxidescout_lib::ssh::{PromptBroker, RusshDialer};

#[derive(Parser)]
#[command(name = "oxidescout")]
#[command(author, version, about = "Browse, edit and transfer files on SSH hosts")]
struct Cli {
    /// SSH client config to read instead of ~/.ssh/config
    #[arg(long, env = "OXIDESCOUT_SSH_CONFIG", global = true)]
    ssh_config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List host aliases from the SSH config
    Hosts,

    /// Show the resolved connection parameters of a host
    Resolve { alias: String },

    /// List a remote directory
    Ls {
        alias: String,
        #[arg(default_value = "/")]
        path: String,
        /// Directories first, then by name
        #[arg(long)]
        sorted: bool,
    },

    /// Print a remote text file
    Cat { alias: String, path: String },

    /// Write stdin to a remote file
    Write { alias: String, path: String },

    /// Download a remote file or directory
    Get {
        alias: String,
        remote: String,
        #[arg(default_value = ".")]
        local_dir: PathBuf,
    },

    /// Upload a local file or directory
    Put {
        alias: String,
        local: PathBuf,
        remote_dir: String,
    },

    /// Serve the remote filesystem over WebDAV until Ctrl-C
    Webdav {
        alias: String,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        bind: Option<IpAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    oxidescout_lib::init_logging(level);

    let storage = ConfigStorage::new().context("Failed to locate config directory")?;
    let frontend = Arc::new(TerminalFrontend::new(storage.clone()));

    let (broker, requests) = PromptBroker::channel();
    tokio::spawn(serve_prompts(requests, frontend.clone()));

    let state = AppState::load(
        storage,
        cli.ssh_config,
        Arc::new(RusshDialer),
        Arc::new(broker),
        frontend.clone(),
    )
    .await
    .context("Failed to initialize")?;

    let result = run(&state, cli.command).await;
    frontend.flush().await;

    if let Err(e) = result {
        frontend.display_error(&e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(state: &AppState, command: Commands) -> Result<(), CommandError> {
    match command {
        Commands::Hosts => {
            let open = commands::config::open_hosts(state);
            for alias in commands::config::list_hosts(state).await? {
                let marker = if open.contains(&alias) { "*" } else { " " };
                println!("{} {}", marker, alias);
            }
        }
        Commands::Resolve { alias } => {
            let summary = commands::config::resolve_host(state, &alias).await?;
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            println!("{}", json);
        }
        Commands::Ls {
            alias,
            path,
            sorted,
        } => {
            let session = commands::ssh::connect(state, &alias).await?;
            let result = commands::sftp::list_dir(&session, &path, sorted).await;
            commands::ssh::disconnect(state, session).await;

            for entry in result? {
                let suffix = if entry.is_dir { "/" } else { "" };
                let link = if entry.is_link {
                    format!(" -> {}", entry.full_path)
                } else {
                    String::new()
                };
                println!("{}{}{}", entry.name, suffix, link);
            }
        }
        Commands::Cat { alias, path } => {
            let session = commands::ssh::connect(state, &alias).await?;
            let result = commands::sftp::read_file(&session, &path).await;
            commands::ssh::disconnect(state, session).await;

            match result? {
                TextContent::Text { data, .. } => print!("{}", data),
                TextContent::Binary { size } => {
                    eprintln!("{}: binary file ({} bytes), use `get` instead", path, size)
                }
            }
        }
        Commands::Write { alias, path } => {
            let mut content = Vec::new();
            tokio::io::stdin().read_to_end(&mut content).await?;

            let session = commands::ssh::connect(state, &alias).await?;
            let result = commands::sftp::write_file(&session, &path, &content).await;
            commands::ssh::disconnect(state, session).await;
            result?;
        }
        Commands::Get {
            alias,
            remote,
            local_dir,
        } => {
            let session = commands::ssh::connect(state, &alias).await?;
            let result = commands::sftp::download(&session, &remote, &local_dir).await;
            commands::ssh::disconnect(state, session).await;

            let summary = result?;
            println!(
                "Downloaded {} file(s), {} directorie(s), {} bytes",
                summary.files, summary.directories, summary.bytes
            );
        }
        Commands::Put {
            alias,
            local,
            remote_dir,
        } => {
            let session = commands::ssh::connect(state, &alias).await?;
            let result = commands::sftp::upload(&session, &local, &remote_dir).await;
            commands::ssh::disconnect(state, session).await;

            let summary = result?;
            println!(
                "Uploaded {} file(s), {} directorie(s), {} bytes",
                summary.files, summary.directories, summary.bytes
            );
        }
        Commands::Webdav { alias, port, bind } => {
            let mut settings = state.config_snapshot().webdav;
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(bind) = bind {
                settings.bind_address = bind;
            }

            let session = commands::ssh::connect(state, &alias).await?;
            let server = match commands::webdav::start_webdav(&session, &settings).await {
                Ok(server) => server,
                Err(e) => {
                    commands::ssh::disconnect(state, session).await;
                    return Err(e.into());
                }
            };

            println!("WebDAV share for {} at {}", alias, server.url());
            println!("Connect with any credentials. Press Ctrl-C to stop.");

            let signal = tokio::signal::ctrl_c().await;
            server.stop().await;
            commands::ssh::disconnect(state, session).await;
            signal?;
        }
    }
    Ok(())
}
