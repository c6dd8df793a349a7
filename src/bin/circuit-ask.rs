use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use circuit_assistant::inference::{
    config, AssistantClient, ChannelObserver, ConfigOverride, StreamUpdate,
};

#[derive(Parser)]
#[command(name = "circuit-ask")]
#[command(author, version, about = "Ask the circuit assistant a question", long_about = None)]
struct Cli {
    /// Override the API key for this run
    #[arg(long, global = true, env = "CIRCUIT_ASK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Override the endpoint root, e.g. https://api.openai.com/v1
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Override the model name
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream an answer to stdout
    Ask {
        prompt: String,

        /// Circuit file whose contents are attached to the question
        #[arg(short, long)]
        context_file: Option<PathBuf>,

        /// Wait for the whole response instead of streaming fragments
        #[arg(long)]
        collect: bool,
    },

    /// Print the effective API configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    circuit_assistant::init_tracing();

    config::override_config(&ConfigOverride {
        api_key: cli.api_key,
        base_url: cli.base_url,
        model: cli.model,
    });

    match cli.command {
        Commands::Config => {
            let effective = config::current();
            println!("API Key:  {}", effective.masked_api_key());
            println!("Base URL: {}", effective.base_url);
            println!("Model:    {}", effective.model);
            Ok(())
        }
        Commands::Ask {
            prompt,
            context_file,
            collect,
        } => {
            let context = match context_file {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                ),
                None => None,
            };
            let client = AssistantClient::new()?;
            if collect {
                ask_collected(&client, &prompt, context.as_deref()).await
            } else {
                ask_streaming(&client, prompt, context).await
            }
        }
    }
}

async fn ask_collected(client: &AssistantClient, prompt: &str, context: Option<&str>) -> Result<()> {
    match client.complete(prompt, context).await {
        Some(response) => {
            println!("{response}");
            Ok(())
        }
        None => bail!("no response received"),
    }
}

/// The worker task reads the network; this task plays the UI loop and is the
/// only one that writes to stdout.
async fn ask_streaming(client: &AssistantClient, prompt: String, context: Option<String>) -> Result<()> {
    let (observer, mut updates) = ChannelObserver::channel();
    let worker = client.spawn_stream(prompt, context, Arc::new(observer));

    let mut stdout = std::io::stdout();
    let mut in_thinking = false;
    let mut in_answer = false;
    let mut failure = None;

    while let Some(update) = updates.recv().await {
        match update {
            StreamUpdate::Thinking(fragment) => {
                if !in_thinking {
                    writeln!(stdout, "[Thinking Process]")?;
                    in_thinking = true;
                }
                write!(stdout, "{fragment}")?;
            }
            StreamUpdate::Answer(fragment) => {
                if !in_answer {
                    if in_thinking {
                        writeln!(stdout, "\n")?;
                    }
                    writeln!(stdout, "[Final Answer]")?;
                    in_answer = true;
                }
                write!(stdout, "{fragment}")?;
            }
            StreamUpdate::Complete { .. } => {
                writeln!(stdout)?;
                break;
            }
            StreamUpdate::Error(message) => {
                failure = Some(message);
                break;
            }
        }
        stdout.flush()?;
    }

    let succeeded = worker.await.context("stream worker panicked")?;
    match failure {
        Some(message) => bail!("{message}"),
        None if !succeeded => bail!("stream ended without a result"),
        None => Ok(()),
    }
}
