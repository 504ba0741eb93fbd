use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::app::{AppContext, WorkflowCheck};
use crate::chat::{CancelHandle, ChatController, MessageDisplay, Transcript, TurnOutcome};
use crate::config::Config;
use crate::graph::workflow::WorkflowDocument;
use crate::stream::ProtocolEvent;

#[derive(Parser)]
#[command(name = "archivist", about = "Command-line client for the Archivist agent backend")]
pub struct Cli {
    /// Backend URL (overrides ARCHIVIST_SERVER)
    #[arg(long, global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List agents that have a saved workflow
    Agents,
    /// List the node types the backend offers
    Nodes,
    #[command(subcommand)]
    Workflow(WorkflowCommand),
    #[command(subcommand)]
    Chat(ChatCommand),
}

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Print an agent's workflow document
    Show { name: String },
    /// Upload a workflow document
    Save { file: PathBuf },
    /// Create an empty workflow and print its id
    New { name: String },
    /// Register a workflow with the event triggers
    Publish { name: String, id: String },
    /// Type-check every connection of a workflow file
    Check {
        file: PathBuf,
        /// Read node types from this file instead of the backend
        #[arg(long)]
        schema: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ChatCommand {
    /// Send a message and stream the reply
    Send { text: String },
    /// Rewrite the message at ADDRESS and stream a new reply
    Edit {
        address: String,
        text: String,
        /// Show the conversation up to the edited message first
        #[arg(long)]
        chat: Option<String>,
    },
    /// List stored conversations
    List,
    /// Print a stored conversation
    Show { id: String },
    /// Start a new conversation
    New,
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Command::Agents => {
            let ctx = AppContext::connect(config)?;
            for agent in ctx.api.list_agents().await? {
                println!("{agent}");
            }
        }
        Command::Nodes => {
            let ctx = AppContext::bootstrap(config).await?;
            for (type_name, descriptor) in ctx.registry().iter() {
                println!(
                    "{type_name}  inputs={} outputs={} settings={}",
                    serde_json::to_string(&descriptor.inputs)?,
                    serde_json::to_string(&descriptor.outputs)?,
                    serde_json::to_string(&descriptor.settings)?,
                );
            }
        }
        Command::Workflow(command) => run_workflow(command, config).await?,
        Command::Chat(command) => run_chat(command, config).await?,
    }
    Ok(())
}

async fn run_workflow(command: WorkflowCommand, config: Config) -> Result<()> {
    match command {
        WorkflowCommand::Show { name } => {
            let ctx = AppContext::connect(config)?;
            let doc = ctx
                .api
                .load_agent_workflow(&name)
                .await
                .with_context(|| format!("failed to load workflow for agent '{name}'"))?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        WorkflowCommand::Save { file } => {
            let ctx = AppContext::connect(config)?;
            let doc = read_workflow(&file)?;
            ctx.api.save_workflow(&doc).await.context("failed to save workflow")?;
            println!("Saved {}", file.display());
        }
        WorkflowCommand::New { name } => {
            let ctx = AppContext::connect(config)?;
            println!("{}", ctx.api.new_workflow(&name).await?);
        }
        WorkflowCommand::Publish { name, id } => {
            let ctx = AppContext::connect(config)?;
            let status = ctx.api.add_workflow_to_events(&name, &id).await?;
            if status != "200" {
                anyhow::bail!("backend refused to register workflow '{name}': status {status}");
            }
            println!("Registered {name} ({id})");
        }
        WorkflowCommand::Check { file, schema } => {
            let ctx = match schema {
                Some(path) => {
                    let mut ctx = AppContext::connect(config)?;
                    ctx.load_registry(&read_json(&path)?)?;
                    ctx
                }
                None => AppContext::bootstrap(config).await?,
            };
            let check = ctx.check_workflow(&read_workflow(&file)?)?;
            print!("{}", format_check(&check));
            if !check.is_clean() {
                anyhow::bail!("workflow {} has problems", file.display());
            }
        }
    }
    Ok(())
}

async fn run_chat(command: ChatCommand, config: Config) -> Result<()> {
    let ctx = AppContext::connect(config)?;
    match command {
        ChatCommand::Send { text } => {
            let controller = ChatController::new(ctx.api.clone());
            let outcome = stream_turn(|cancel| {
                let controller = &controller;
                let text = text.as_str();
                async move { controller.send(text, &cancel, print_event).await }
            })
            .await?;
            report_outcome(&outcome);
        }
        ChatCommand::Edit { address, text, chat } => {
            if let Some(id) = chat {
                let conversation = ctx.api.load_chat(&id).await?;
                let mut transcript = Transcript::from_conversation(&conversation);
                transcript.truncate_for_edit(&address, &text)?;
                print_transcript(&transcript);
            }
            let controller = ChatController::new(ctx.api.clone());
            let outcome = stream_turn(|cancel| {
                let controller = &controller;
                let (address, text) = (address.as_str(), text.as_str());
                async move { controller.edit(address, text, &cancel, print_event).await }
            })
            .await?;
            report_outcome(&outcome);
        }
        ChatCommand::List => {
            for chat in ctx.api.list_chats().await? {
                println!("{}", chat.id);
            }
        }
        ChatCommand::Show { id } => {
            let conversation = ctx.api.load_chat(&id).await?;
            print_transcript(&Transcript::from_conversation(&conversation));
        }
        ChatCommand::New => {
            println!("{}", ctx.api.new_chat().await?);
        }
    }
    Ok(())
}

/// Run one turn with Ctrl-C wired to its cancel handle.
async fn stream_turn<F, Fut>(turn: F) -> Result<TurnOutcome>
where
    F: FnOnce(CancelHandle) -> Fut,
    Fut: std::future::Future<Output = Result<TurnOutcome, crate::chat::ChatError>>,
{
    let cancel = CancelHandle::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling chat turn");
            on_interrupt.cancel();
        }
    });

    let outcome = turn(cancel).await;
    watcher.abort();
    Ok(outcome?)
}

fn print_event(event: &ProtocolEvent, _display: &MessageDisplay) {
    if let ProtocolEvent::MessageDelta { text } = event {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

fn report_outcome(outcome: &TurnOutcome) {
    println!();
    if outcome.cancelled {
        eprintln!("(cancelled)");
    }
    if let Some(address) = outcome.assistant_address() {
        eprintln!("reply stored at {address}");
    }
}

fn print_transcript(transcript: &Transcript) {
    for entry in transcript.entries() {
        let address = entry.address.as_deref().unwrap_or("-");
        println!("[{address}] {}: {}", entry.role, entry.text);
    }
}

pub fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn read_workflow(path: &Path) -> Result<WorkflowDocument> {
    serde_json::from_value(read_json(path)?)
        .with_context(|| format!("{} is not a workflow export", path.display()))
}

pub fn format_check(check: &WorkflowCheck) -> String {
    let mut out = format!(
        "{} nodes, {} valid connections\n",
        check.nodes, check.audit.accepted
    );
    for connection in &check.audit.rejected {
        out.push_str(&format!("rejected: {connection} (port types differ)\n"));
    }
    for (connection, error) in &check.audit.errors {
        out.push_str(&format!("invalid: {connection}: {error}\n"));
    }
    match &check.levels {
        Ok(levels) => {
            for (depth, level) in levels.iter().enumerate() {
                out.push_str(&format!("level {depth}: {}\n", level.join(", ")));
            }
        }
        Err(e) => out.push_str(&format!("no execution order: {e}\n")),
    }
    out
}
