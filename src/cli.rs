use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::config::ClientConfig;
use crate::custom_domains::UpdateCustomDomainInput;
use crate::load_config::{load_config, load_config_from_env};
use crate::session::Session;
use crate::toaster::{CodeSource, CreateToasterInput, GitSource, UpdateToasterInput};
use crate::user::SigninInput;

/// CLI for the Toastate cloud: manage toasters and custom domains.
#[derive(Parser)]
#[clap(
    name = "toastate",
    version,
    about = "Deploy and manage Toastate toasters and custom domains"
)]
pub struct Cli {
    /// Path to a YAML config file; defaults plus TOASTATE_* env vars otherwise
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Exchange email and password for a session token (printed to stdout)
    Signin {
        #[clap(long)]
        email: String,
        #[clap(long, env = "TOASTATE_PASSWORD", hide_env_values = true)]
        password: String,
        /// Request a long-lived session
        #[clap(long)]
        extended: bool,
    },
    /// Manage toasters
    #[clap(subcommand)]
    Toaster(ToasterCommand),
    /// Manage custom domains
    #[clap(subcommand)]
    Domain(DomainCommand),
}

#[derive(Subcommand)]
pub enum ToasterCommand {
    /// List your toasters
    List,
    /// Show one toaster
    Get { id: String },
    /// Create a toaster from a local folder or a git repository
    Create(DeployArgs),
    /// Update a toaster's code or settings
    Update {
        id: String,
        #[clap(flatten)]
        deploy: DeployArgs,
        /// Rebuild from the git repository used last time
        #[clap(long)]
        git_refresh: bool,
    },
    /// Delete one or more toasters
    Delete {
        #[clap(required = true)]
        ids: Vec<String>,
    },
    /// List the files of a toaster's code
    Files { id: String },
    /// Print one file of a toaster's code
    File { id: String, path: String },
    /// Print the logs of a toaster, optionally of one execution
    Logs { id: String, exe_id: Option<String> },
}

#[derive(Args)]
pub struct DeployArgs {
    /// Upload every file below this directory
    #[clap(long, conflicts_with = "git_url")]
    pub folder: Option<PathBuf>,
    /// Build from this git repository instead
    #[clap(long)]
    pub git_url: Option<String>,
    #[clap(long, requires = "git_url")]
    pub git_branch: Option<String>,
    #[clap(long)]
    pub name: Option<String>,
    /// Build command, one flag per argument
    #[clap(long = "build-cmd")]
    pub build_cmd: Vec<String>,
    /// Execution command, one flag per argument
    #[clap(long = "exe-cmd")]
    pub exe_cmd: Vec<String>,
    /// KEY=VALUE environment variables
    #[clap(long)]
    pub env: Vec<String>,
    #[clap(long)]
    pub timeout_secs: Option<i64>,
    #[clap(long)]
    pub joinable_for_secs: Option<i64>,
    #[clap(long)]
    pub max_concurrent_joiners: Option<i64>,
}

impl DeployArgs {
    fn code(&mut self) -> CodeSource {
        if let Some(folder) = self.folder.take() {
            return CodeSource::Folder(folder);
        }
        match self.git_url.take() {
            Some(url) => CodeSource::Git(GitSource {
                url,
                branch: self.git_branch.take().unwrap_or_default(),
                ..GitSource::default()
            }),
            None => CodeSource::None,
        }
    }
}

#[derive(Subcommand)]
pub enum DomainCommand {
    /// List your custom domains
    List,
    /// Show one custom domain and its DNS records
    Get { id: String },
    /// Link subdomains of a custom domain to toasters (SUBDOMAIN=TOASTER_ID)
    Link {
        id: String,
        #[clap(required = true)]
        links: Vec<String>,
    },
    /// Delete a custom domain
    Delete { id: String },
}

fn load(config: Option<PathBuf>) -> Result<ClientConfig> {
    match config {
        Some(path) => load_config(path),
        None => load_config_from_env(),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let config = load(cli.config)?;
    let session = Session::from_config(config).context("Failed to start session")?;

    match cli.command {
        Commands::Signin {
            email,
            password,
            extended,
        } => {
            let out = session
                .signin(&SigninInput {
                    email,
                    password,
                    extended_session: extended,
                })
                .await?;
            println!("{}", out.token);
        }
        Commands::Toaster(command) => run_toaster(&session, command).await?,
        Commands::Domain(command) => run_domain(&session, command).await?,
    }
    Ok(())
}

async fn run_toaster(session: &Session, command: ToasterCommand) -> Result<()> {
    match command {
        ToasterCommand::List => print_json(&session.list_toasters().await?)?,
        ToasterCommand::Get { id } => print_json(&session.get_toaster(&id).await?)?,
        ToasterCommand::Create(mut args) => {
            let input = CreateToasterInput {
                code: args.code(),
                build_cmd: args.build_cmd,
                exe_cmd: args.exe_cmd,
                env: args.env,
                joinable_for_secs: args.joinable_for_secs.unwrap_or_default(),
                max_concurrent_joiners: args.max_concurrent_joiners.unwrap_or_default(),
                timeout_secs: args.timeout_secs.unwrap_or_default(),
                name: args.name.unwrap_or_default(),
                ..CreateToasterInput::default()
            };
            let deployment = session.create_toaster(input).await?;
            print_json(&deployment.toaster)?;
            eprintln!("Deployed at {}", deployment.domain);
        }
        ToasterCommand::Update {
            id,
            mut deploy,
            git_refresh,
        } => {
            let input = UpdateToasterInput {
                code: deploy.code(),
                git_refresh,
                build_cmd: deploy.build_cmd,
                exe_cmd: deploy.exe_cmd,
                env: deploy.env,
                joinable_for_secs: deploy.joinable_for_secs,
                max_concurrent_joiners: deploy.max_concurrent_joiners,
                timeout_secs: deploy.timeout_secs,
                name: deploy.name,
                ..UpdateToasterInput::default()
            };
            let deployment = session.update_toaster(&id, input).await?;
            print_json(&deployment.toaster)?;
        }
        ToasterCommand::Delete { ids } => {
            session.delete_toasters(&ids).await?;
            eprintln!("Deleted {} toaster(s)", ids.len());
        }
        ToasterCommand::Files { id } => {
            for file in session.list_toaster_files(&id).await? {
                println!("{file}");
            }
        }
        ToasterCommand::File { id, path } => {
            let mut body = session.get_toaster_file(&id, &path).await?;
            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = body.next().await {
                stdout.write_all(&chunk?).await?;
            }
            stdout.flush().await?;
        }
        ToasterCommand::Logs { id, exe_id } => {
            let logs = session
                .get_toaster_logs(&id, exe_id.as_deref().unwrap_or_default())
                .await?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&logs).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn run_domain(session: &Session, command: DomainCommand) -> Result<()> {
    match command {
        DomainCommand::List => print_json(&session.list_custom_domains().await?)?,
        DomainCommand::Get { id } => {
            let out = session.get_custom_domain(&id).await?;
            if let Some(domain) = &out.custom_domain {
                print_json(domain)?;
            }
            if !out.ownership_check_txt_record_name.is_empty() {
                println!(
                    "TXT {} = {}",
                    out.ownership_check_txt_record_name, out.ownership_check_txt_record_value
                );
            }
            for (name, target) in &out.cnames_record {
                println!("CNAME {name} -> {target}");
            }
        }
        DomainCommand::Link { id, links } => {
            let mut input = UpdateCustomDomainInput::default();
            for link in links {
                let (subdomain, toaster) = link
                    .split_once('=')
                    .with_context(|| format!("expected SUBDOMAIN=TOASTER_ID, got {link:?}"))?;
                input
                    .linked_toasters
                    .insert(subdomain.to_string(), toaster.to_string());
            }
            let out = session.update_custom_domain(&id, &input).await?;
            if let Some(domain) = &out.custom_domain {
                print_json(domain)?;
            }
        }
        DomainCommand::Delete { id } => {
            session.delete_custom_domain(&id).await?;
            eprintln!("Deleted custom domain {id}");
        }
    }
    Ok(())
}
