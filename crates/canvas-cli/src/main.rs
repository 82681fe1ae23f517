//! canvas-chat - terminal front end for the Canvas data assistant

mod capabilities;
mod commands;
mod config;
mod history;
mod render;

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use anyhow::bail;
use canvas_ai::providers::openai::OpenAIBackend;
use canvas_ai::{ChatBackend, Role};
use canvas_assistant::{ChatEvent, Conversation, ConversationConfig, ConversationHandle};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing_subscriber::EnvFilter;

use capabilities::SharedHostState;
use commands::CommandResult;
use history::InputHistory;
use render::StreamPrinter;

/// canvas-chat - ask questions about your course data
#[derive(Parser, Debug)]
#[command(name = "canvas-chat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to request (overrides the config file and AI_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Chat-completion endpoint base URL (overrides the config file and AI_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Send a single prompt, print the reply and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let config = config::Config::load();
    let backend_config = config.backend_config(args.base_url, args.model)?;
    let model = backend_config.model.clone();

    let mut conversation_config = ConversationConfig::new(config.system_prompt()?);
    if let Some(timeout) = config.tool_timeout() {
        conversation_config = conversation_config.with_tool_timeout(timeout);
    }

    let host = SharedHostState::default();
    let registry = capabilities::host_registry(&host)?;
    let backend: Arc<dyn ChatBackend> = Arc::new(OpenAIBackend::new(backend_config));
    let mut conversation = Conversation::new(conversation_config, backend, registry);

    let result = match args.prompt {
        Some(prompt) => run_prompt(&conversation, &prompt).await,
        None => run_interactive(&conversation, &host, &model).await,
    };

    conversation.dispose();
    result
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("canvas=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// One-shot mode: send `prompt`, wait for the conversation to settle and
/// print the final answer
async fn run_prompt(conversation: &ConversationHandle, prompt: &str) -> anyhow::Result<()> {
    let mut events = conversation.subscribe();
    conversation.send_message(prompt)?;

    tokio::select! {
        _ = conversation.wait_for_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            conversation.cancel_stream();
            bail!("Cancelled");
        }
    }

    let mut failure = None;
    loop {
        match events.try_recv() {
            Ok(ChatEvent::ToolExecutionEnd {
                capability,
                is_error: true,
                ..
            }) => eprintln!("[{} failed]", capability),
            Ok(ChatEvent::Error { message }) => failure = Some(message),
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }

    let messages = conversation.messages();
    match messages.last() {
        Some(message) if message.role == Role::Assistant && !message.has_tool_calls() => {
            println!("{}", message.visible_text());
            Ok(())
        }
        _ => bail!(
            "{}",
            failure.unwrap_or_else(|| "The assistant did not reply".to_string())
        ),
    }
}

async fn run_interactive(
    conversation: &ConversationHandle,
    host: &SharedHostState,
    model: &str,
) -> anyhow::Result<()> {
    let mut history = match InputHistory::default_path() {
        Some(path) => InputHistory::load(path),
        None => InputHistory::in_memory(),
    };

    if std::io::stderr().is_terminal() {
        eprintln!("canvas-chat ({})", model);
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut events = conversation.subscribe();
    let mut printer = StreamPrinter::new(std::io::stdout());

    print_prompt(host)?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                // EOF
                let Some(line) = line? else { break };
                let input = line.trim();

                if let Some(result) = commands::parse_command(input) {
                    match result {
                        CommandResult::Stop => {
                            if conversation.is_streaming() {
                                conversation.cancel_stream();
                            } else {
                                println!("Nothing to stop.");
                            }
                        }
                        CommandResult::History => {
                            println!("{}", commands::format_history(history.entries()));
                        }
                        CommandResult::Messages => {
                            println!("{}", commands::format_messages(&conversation.messages()));
                        }
                        CommandResult::Chart => {
                            println!("{}", commands::format_chart(host.lock().chart.as_ref()));
                        }
                        CommandResult::ClearHistory => {
                            history.clear();
                            println!("Cleared input history.");
                        }
                        CommandResult::Message(msg) => println!("{}", msg),
                        CommandResult::Exit => break,
                        CommandResult::Unknown(cmd) => {
                            println!("Unknown command: /{}", cmd);
                            println!("Type /help for available commands.");
                        }
                    }
                } else if !input.is_empty() {
                    if conversation.is_streaming() {
                        println!("[A reply is still streaming; wait for it or /stop it]");
                        continue;
                    }
                    history.record(input);
                    conversation.send_message(input)?;
                    continue;
                }

                if !conversation.is_streaming() {
                    print_prompt(host)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if conversation.is_streaming() {
                    conversation.cancel_stream();
                } else {
                    println!();
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if printer.handle(&event)? && !conversation.is_streaming() {
                        print_prompt(host)?;
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::warn!("Skipped {} conversation events", n),
                Err(RecvError::Closed) => break,
            }
        }
    }

    Ok(())
}

/// Prompt prefixed with the session title, once one is set
fn print_prompt(host: &SharedHostState) -> std::io::Result<()> {
    let title = host.lock().title.clone();
    match title {
        Some(title) => print!("[{}]> ", title),
        None => print!("> "),
    }
    std::io::stdout().flush()
}
