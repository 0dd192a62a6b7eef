//! Encore CLI binary entry point.

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use encore::cli::{knowledge_from_text, ChatArgs, Cli, Commands, Renderer};
use encore::config::EncoreConfig;
use encore::conversation::Pipeline;
use encore::model::OllamaClient;
use encore::service::ChatService;
use encore::types::{Role, SendOptions};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EncoreConfig::load_from(path),
        None => EncoreConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Chat(args) => handle_chat(args, config).await,
        Commands::Models => handle_models(config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_models(config: EncoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = OllamaClient::new(config.ollama_base_url, config.model);
    for model in client.list_models().await? {
        match model.size {
            Some(size) => println!("{}\t{:.1} GB", model.name, size as f64 / 1e9),
            None => println!("{}", model.name),
        }
    }
    Ok(())
}

async fn handle_chat(args: ChatArgs, mut config: EncoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(model) = args.model {
        config.model = model;
    }
    let client = OllamaClient::new(config.ollama_base_url.clone(), config.model.clone());
    if !client.health_check().await {
        return Err(format!("Ollama is not reachable at {}", client.base_url()).into());
    }

    let mut pipeline = Pipeline::new(Arc::new(client), config);
    if let Some(path) = &args.knowledge {
        let text = tokio::fs::read_to_string(path).await?;
        pipeline = pipeline.with_retriever(Arc::new(knowledge_from_text(&text)));
    }

    let service = ChatService::new(pipeline)?;
    service.start().await;
    let session_id = args.session.unwrap_or_else(ChatService::new_session_id);
    eprintln!("session {session_id} (/reset, /history, /summary <text>, /quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = Renderer::new(!args.hide_thinking);
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                service.reset(&session_id).await?;
                eprintln!("history cleared");
                continue;
            }
            "/history" => {
                for message in service.history(&session_id).await {
                    let who = match message.role {
                        Role::User => "you",
                        Role::Assistant => "encore",
                        Role::Tool => "tool",
                        Role::System => "system",
                    };
                    eprintln!("{who}: {}", message.content);
                }
                continue;
            }
            _ => {}
        }
        if let Some(summary) = line.strip_prefix("/summary ") {
            service.set_context_summary(&session_id, summary).await;
            eprintln!("summary attached to next message");
            continue;
        }

        let options = SendOptions::builder()
            .temperature(args.creativity.temperature())
            .build();
        let mut events = service.send_stream(&session_id, line, options).await?;
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => renderer.render(&event),
                Err(e) => {
                    renderer.finish();
                    eprintln!("Error: {e}");
                    break;
                }
            }
        }
        renderer.finish();
    }

    service.shutdown().await;
    Ok(())
}
