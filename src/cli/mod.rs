//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::Config;
use crate::manager::PolicyManager;
use crate::model::UserFields;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "oxpolicy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        help = "Path to a TOML configuration file",
        long_help = "Path to a TOML configuration file. Without one, records live in ./oxpolicy.db \
                     and the cache is in-process, so each command starts with a cold cache and \
                     staged write-back updates are flushed when the command exits."
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "serve", about = "Run the write-back reconcilers until Ctrl-C")]
    Serve,

    #[command(name = "read", about = "Read all records through a policy")]
    Read(ReadArgs),

    #[command(name = "create", about = "Create a record through a write-through policy")]
    Create(CreateArgs),

    #[command(name = "update", about = "Update a record through a write-back policy")]
    Update(UpdateArgs),

    #[command(name = "reconcile", about = "Run one reconcile pass of a write-back policy")]
    Reconcile(ReadArgs),

    #[command(name = "status", about = "Show cache, backing store and policy status")]
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    #[arg(help = "Policy name")]
    pub policy: String,
}

#[derive(Args, Debug, Clone)]
pub struct FieldArgs {
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

impl From<FieldArgs> for UserFields {
    fn from(args: FieldArgs) -> Self {
        UserFields {
            name: args.name,
            email: args.email,
            description: args.description,
        }
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(help = "Write-through policy name")]
    pub policy: String,

    #[command(flatten)]
    pub fields: FieldArgs,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[arg(help = "Write-back policy name")]
    pub policy: String,

    #[arg(help = "Record identifier")]
    pub id: i64,

    #[command(flatten)]
    pub fields: FieldArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(short, long, help = "Append metrics in Prometheus format")]
    pub prometheus: bool,
}

/// 命令输出
#[derive(Debug, Serialize)]
pub struct Response<T: Serialize> {
    pub message: String,
    pub data: T,
}

impl<T: Serialize> Response<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }

    pub fn print(&self) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}

mod records;
mod serve;
mod status;

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    crate::telemetry::init_tracing(&config.global)?;

    let manager = PolicyManager::init(config)
        .await
        .context("Failed to initialize policy manager")?;

    let result = match cli.command {
        Commands::Serve => serve::execute(&manager).await,
        Commands::Read(args) => records::read(&manager, &args).await,
        Commands::Create(args) => records::create(&manager, args).await,
        Commands::Update(args) => records::update(&manager, args).await,
        Commands::Reconcile(args) => records::reconcile(&manager, &args).await,
        Commands::Status(args) => status::execute(&manager, &args).await,
    };

    let closed = manager.shutdown().await;
    crate::telemetry::shutdown_tracing();
    result?;
    closed.context("Shutdown failed")?;
    Ok(())
}
