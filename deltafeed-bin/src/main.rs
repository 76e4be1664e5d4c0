use std::io::{self, Read, Write};
use std::path::PathBuf;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use deltafeed_core::{
    Completion, Config, CoreResult, DeltaSink, GenerateRequest, Outcome, StreamClient,
    StreamHandle, StreamRequest, http_client::RequestCtx, stream::ByteStream,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "deltafeed CLI: stream generated text", long_about = None)]
struct Cli {
    /// JSON or TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override server.base_url
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Sent as X-Request-Id
    #[arg(long, global = true)]
    request_id: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Free-form generation from a prompt
    Generate {
        #[arg(short, long)]
        prompt: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        top_p: Option<f32>,
    },
    /// Generate one segment of a story session
    Segment {
        #[arg(long)]
        session: String,
        #[arg(long)]
        index: u32,
    },
    /// Rewrite a segment with feedback
    Revise {
        #[arg(long)]
        session: String,
        #[arg(long)]
        index: u32,
        #[arg(long)]
        feedback: String,
    },
    /// Stream the reply for a chat conversation
    Chat {
        #[arg(long)]
        conversation: String,
    },
    /// Replay a captured SSE body through the decoder (stdin when no file is given)
    Decode {
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,
    },
}

/// Prints deltas as they arrive.
#[derive(Default)]
struct StdoutSink {
    saw_delta: bool,
}

impl DeltaSink for StdoutSink {
    fn on_delta(&mut self, text: &str) {
        self.saw_delta = true;
        print!("{}", text);
        io::stdout().flush().ok();
    }

    fn on_done(&mut self, completion: Completion) {
        if self.saw_delta {
            println!();
        }
        eprintln!("[done: {}]", completion.as_str());
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if let Some(url) = &cli.base_url {
        cfg.server.base_url = url.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn read_capture(file: Option<&PathBuf>) -> anyhow::Result<Vec<u8>> {
    let mut raw = Vec::new();
    match file {
        Some(path) => raw = std::fs::read(path)?,
        None => {
            io::stdin().read_to_end(&mut raw)?;
        }
    }
    Ok(raw)
}

fn chunked(raw: Vec<u8>, chunk_size: usize) -> ByteStream {
    let raw = Bytes::from(raw);
    let size = chunk_size.max(1);
    let chunks: Vec<CoreResult<Bytes>> = (0..raw.len())
        .step_by(size)
        .map(|start| Ok(raw.slice(start..(start + size).min(raw.len()))))
        .collect();
    Box::pin(futures_util::stream::iter(chunks))
}

/// Wait for the stream, cancelling it on Ctrl-C.
async fn drive(handle: StreamHandle<StdoutSink>) -> anyhow::Result<()> {
    let canceller = handle.canceller();
    let id = handle.id();
    let join = handle.join();
    tokio::pin!(join);
    let finished = tokio::select! {
        res = &mut join => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(stream_id = id, "interrupt received, cancelling stream");
            canceller.cancel();
            join.await?
        }
    };
    tracing::debug!(
        deltas = finished.stats.deltas,
        malformed = finished.stats.malformed,
        bytes = finished.stats.bytes,
        "stream summary"
    );
    match finished.outcome {
        Ok(Outcome::Completed(_)) => Ok(()),
        Ok(Outcome::Cancelled) => {
            if finished.sink.saw_delta {
                println!();
            }
            eprintln!("[cancelled]");
            Ok(())
        }
        Err(e) => {
            if finished.sink.saw_delta {
                println!();
            }
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    let req = match cli.command {
        Commands::Generate {
            prompt,
            model,
            temperature,
            max_tokens,
            top_p,
        } => StreamRequest::Generate(GenerateRequest {
            model,
            prompt,
            temperature,
            max_tokens,
            top_p,
        }),
        Commands::Segment { session, index } => StreamRequest::Segment {
            session_id: session,
            index,
        },
        Commands::Revise {
            session,
            index,
            feedback,
        } => StreamRequest::Revise {
            session_id: session,
            index,
            feedback,
        },
        Commands::Chat { conversation } => StreamRequest::Chat {
            conversation_id: conversation,
        },
        Commands::Decode { file, chunk_size } => {
            let raw = read_capture(file.as_ref())?;
            let handle = StreamHandle::spawn(
                "decode",
                chunked(raw, chunk_size),
                StdoutSink::default(),
                cfg.decoder.malformed,
            );
            return drive(handle).await;
        }
    };

    let client = StreamClient::new(&cfg)?;
    let ctx = RequestCtx {
        request_id: cli.request_id.as_deref(),
    };
    let handle = client.start_with(req, &ctx, StdoutSink::default()).await?;
    drive(handle).await
}
