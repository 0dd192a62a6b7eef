//! CLI definitions and terminal rendering for the `encore` binary.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Creativity;
use crate::retrieval::StaticRetriever;
use crate::types::StreamEvent;
use crate::util::truncate;

/// Encore chat CLI
#[derive(Parser, Debug)]
#[command(name = "encore", version, about = "Encore: retrieval-augmented, tool-using chat")]
pub struct Cli {
    /// Config file (defaults to ~/.encore/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive chat session
    Chat(ChatArgs),
    /// List models available on the Ollama server
    Models,
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Session id (random if omitted)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Sampling preset: precise, balanced or creative
    #[arg(short, long, default_value_t = Creativity::Balanced)]
    pub creativity: Creativity,

    /// Override the configured model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Plain-text reference file; paragraphs become retrievable passages
    #[arg(short, long)]
    pub knowledge: Option<PathBuf>,

    /// Hide reasoning output
    #[arg(long)]
    pub hide_thinking: bool,
}

/// Build an in-memory index from blank-line separated paragraphs.
pub fn knowledge_from_text(text: &str) -> StaticRetriever {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .fold(StaticRetriever::new(), |index, paragraph| {
            index.with_chunk(None, paragraph)
        })
}

/// Terminal renderer: visible text to stdout, everything else to stderr.
#[derive(Debug, Default)]
pub struct Renderer {
    pub show_thinking: bool,
    in_thinking: bool,
}

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

impl Renderer {
    pub fn new(show_thinking: bool) -> Self {
        Self {
            show_thinking,
            in_thinking: false,
        }
    }

    pub fn render(&mut self, event: &StreamEvent) {
        if self.in_thinking && !matches!(event, StreamEvent::Thinking { .. }) {
            eprintln!("{RESET}");
            self.in_thinking = false;
        }
        match event {
            StreamEvent::Token { text } => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            StreamEvent::Thinking { text } => {
                if self.show_thinking {
                    if !self.in_thinking {
                        eprint!("{DIM}");
                        self.in_thinking = true;
                    }
                    eprint!("{text}");
                    let _ = std::io::stderr().flush();
                }
            }
            StreamEvent::Status { step, detail } => match detail {
                Some(detail) => eprintln!("[{step}] {detail}"),
                None => eprintln!("[{step}]"),
            },
            StreamEvent::ToolCall { name, result, .. } => {
                let output = truncate(&result.to_string(), 200);
                if result.get("error").is_some() {
                    eprintln!("  {name} failed: {output}");
                } else {
                    eprintln!("  {name}: {output}");
                }
            }
            StreamEvent::Part { kind, data } => {
                let path = data.get("path").and_then(|p| p.as_str()).unwrap_or_default();
                eprintln!("  [{kind}] {path}");
            }
        }
    }

    /// Close any open styling after the stream ends.
    pub fn finish(&mut self) {
        if self.in_thinking {
            eprint!("{RESET}");
            self.in_thinking = false;
        }
        println!();
    }
}
