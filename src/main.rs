//! Glimpse CLI binary entry point.

use std::io::Write;

use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use glimpse::cli::{ChatArgs, Cli, Commands};
use glimpse::config::GlimpseConfig;
use glimpse::host::{Unmetered, UsageGate};
use glimpse::session::{Session, TurnEvent, TurnInput};
use glimpse::tools::ToolRegistry;

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("GLIMPSE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Chat(args) => handle_chat(cli.config, args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_chat(
    config_path: Option<std::path::PathBuf>,
    args: ChatArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = GlimpseConfig::load(config_path.as_deref())?;
    let mut settings = config.engine();
    if let Some(system) = &args.system {
        settings.system_prompt = Some(system.clone());
    }
    let model = args.model_config(&config)?;
    let mut session = Session::new(uuid::Uuid::new_v4().to_string(), &model, settings, ToolRegistry::new())?;
    let mut image = args.load_image().await?;
    let gate = Unmetered;

    if let Some(prompt) = args.prompt {
        let input = attach(TurnInput::new(prompt), image.take());
        return if run_turn(&mut session, input).await {
            Ok(())
        } else {
            Err("turn failed".into())
        };
    }

    eprintln!("glimpse: {} ({}). Ctrl-D to quit.", session.model_id(), session.provider_name());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let _ = std::io::stderr().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let decision = gate.check(session.id()).await?;
        if !decision.allowed {
            eprintln!("Usage limit reached.");
            break;
        }
        run_turn(&mut session, attach(TurnInput::new(line), image.take())).await;
    }
    Ok(())
}

fn attach(input: TurnInput, image: Option<glimpse::types::ImageAttachment>) -> TurnInput {
    match image {
        Some(image) => input.with_image(image),
        None => input,
    }
}

/// Stream one turn to stdout. Returns whether it completed.
async fn run_turn(session: &mut Session, input: TurnInput) -> bool {
    let mut events = session.submit_turn(input);
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            TurnEvent::Text(text) => {
                print!("{text}");
                let _ = stdout.flush();
            }
            TurnEvent::Done(summary) => {
                println!();
                if !summary.is_complete() {
                    eprintln!("{}", summary.message.text());
                    return false;
                }
                for call in &summary.pending_tool_calls {
                    eprintln!("(model requested tool '{}', not run)", call.name);
                }
            }
        }
    }
    true
}
