//! CLI entry point for Docent: build the docs index, search it, chat with the docs.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use docent_core::{
    app_data_dir, browsing_content, build_and_write, embed_docs, load_config, read_index_file,
    scan_docs, sections, status, watch_docs, write_index_file, Assistant, CompletionState, Config,
    Doc, Embedder, LiveMessage, OllamaClient, RemoteEmbedder, Turn, VectorIndex,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,docent=info,docent_core=info";

#[derive(Parser)]
#[command(name = "docent")]
#[command(about = "Docent: ask questions about your documentation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status and the resolved config.
    Status,
    /// Show where Docent stores its config and index (app data directory).
    DataDir,
    /// Scan a docs directory and list the sections it splits into.
    Scan {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Embed every section of a docs directory and write the index file.
    Build {
        /// Docs root (defaults to `docs_root` from config).
        #[arg(long)]
        docs: Option<PathBuf>,
        /// Output index file (defaults to `index_path` from config).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Embed with a local Ollama instead of the site's embeddings endpoint.
        #[arg(long)]
        ollama: bool,
        /// Sections longer than this are indexed without an embedding.
        #[arg(long)]
        max_chars: Option<usize>,
        /// Rebuild whenever a doc changes.
        #[arg(long)]
        watch: bool,
    },
    /// Print the sections most relevant to a query.
    Search {
        query: String,
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Ask one question and stream the answer.
    Ask {
        question: String,
        #[arg(long)]
        index: Option<PathBuf>,
        /// HTML of the page being read, used as extra context.
        #[arg(long, value_name = "HTML_FILE")]
        page: Option<PathBuf>,
    },
    /// Interactive chat. `/clear` resets the history, `/quit` exits, Ctrl-C stops an answer.
    Chat {
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long, value_name = "HTML_FILE")]
        page: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config();
    let command = cli.command.unwrap_or(Commands::Status);
    if needs_network(&command) {
        config.validate().context("invalid config")?;
    }

    match command {
        Commands::Status => {
            println!("Docent backend");
            println!("  core: {}", status());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => bail!("could not determine app data directory"),
        },
        Commands::Scan { path } => scan(&path)?,
        Commands::Build {
            docs,
            out,
            ollama,
            max_chars,
            watch,
        } => {
            let docs = docs
                .or_else(|| config.docs_root())
                .context("no docs root: pass --docs or set docs_root in config")?;
            let out = resolve_index(out, &config)?;
            let embedder = build_embedder(&config, ollama)?;
            let max_chars = max_chars.unwrap_or(config.max_section_chars);
            build(&docs, &out, embedder.as_ref(), max_chars).await?;
            if watch {
                watch_and_rebuild(&docs, &out, embedder.as_ref(), max_chars).await?;
            }
        }
        Commands::Search {
            query,
            index,
            top_k,
        } => {
            let index = load_index(&resolve_index(index, &config)?)?;
            let embedder = RemoteEmbedder::new(&config.api_base, config.request_timeout())?;
            let embedding = embedder.embed(&query).await?;
            let results = index.retrieve_relevant(&embedding, top_k.unwrap_or(config.top_k))?;
            for r in results {
                println!("{:.4}  {}  ({} chars)", r.score, r.section.title, r.section.text.chars().count());
            }
        }
        Commands::Ask {
            question,
            index,
            page,
        } => {
            let mut assistant = open_assistant(&config, index)?;
            let page_text = read_page(page.as_deref())?;
            ask_once(&mut assistant, &question, &page_text).await?;
        }
        Commands::Chat { index, page } => {
            let mut assistant = open_assistant(&config, index)?;
            let page_text = read_page(page.as_deref())?;
            chat(&mut assistant, &page_text).await?;
        }
    }
    Ok(())
}

/// Offline commands keep working with a broken config (e.g. to inspect it).
fn needs_network(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Build { .. }
            | Commands::Search { .. }
            | Commands::Ask { .. }
            | Commands::Chat { .. }
    )
}

fn scan(path: &Path) -> Result<()> {
    let docs = scan_docs(path)?;
    println!("Scanned {} doc(s) under {}", docs.len(), path.display());
    for (doc, sections) in sections::parse_all(&docs) {
        println!("  {}", doc.path.display());
        for s in sections {
            let title = if s.title.is_empty() { "(untitled)" } else { s.title.as_str() };
            println!("    {}{}  ({} chars)", "#".repeat(s.level.into()), title, s.char_len());
        }
    }
    Ok(())
}

fn resolve_index(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    flag.or_else(|| config.resolved_index_path())
        .context("no index path: pass --index/--out or set index_path in config")
}

fn build_embedder(config: &Config, ollama: bool) -> Result<Box<dyn Embedder>> {
    if ollama {
        let client = OllamaClient::from_url(&config.ollama_url)?
            .with_embed_model(config.ollama_embed_model.clone());
        Ok(Box::new(client))
    } else {
        Ok(Box::new(RemoteEmbedder::new(
            &config.api_base,
            config.request_timeout(),
        )?))
    }
}

async fn build(docs: &Path, out: &Path, embedder: &dyn Embedder, max_chars: usize) -> Result<()> {
    let stats = build_and_write(docs, out, embedder, max_chars)
        .await
        .with_context(|| format!("building index from {}", docs.display()))?;
    println!(
        "Indexed {} file(s), {} section(s) ({} embedded, {} too long) → {}",
        stats.files,
        stats.sections,
        stats.embedded,
        stats.oversized,
        out.display()
    );
    Ok(())
}

async fn watch_and_rebuild(
    docs: &Path,
    out: &Path,
    embedder: &dyn Embedder,
    max_chars: usize,
) -> Result<()> {
    // Watcher paths are canonical; index names are relative to the same root.
    let root = docs
        .canonicalize()
        .with_context(|| format!("resolving {}", docs.display()))?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _watcher = watch_docs(&root, move |scan| {
        if tx.send(scan).is_err() {
            tracing::debug!("rebuild loop gone, dropping rescan");
        }
    })?;
    println!("Watching {} (Ctrl-C to stop)", docs.display());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            scan = rx.recv() => {
                let Some(mut scan) = scan else {
                    return Ok(());
                };
                // Only the newest scan matters after a burst of changes.
                while let Ok(newer) = rx.try_recv() {
                    scan = newer;
                }
                match scan {
                    Ok(scanned) => {
                        if let Err(e) = rebuild(&root, &scanned, out, embedder, max_chars).await {
                            tracing::warn!(error = %e, "rebuild failed");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "rescan failed"),
                }
            }
        }
    }
}

async fn rebuild(
    root: &Path,
    scanned: &[Doc],
    out: &Path,
    embedder: &dyn Embedder,
    max_chars: usize,
) -> Result<()> {
    let (files, stats) = embed_docs(root, scanned, embedder, max_chars).await?;
    write_index_file(out, &files)?;
    println!(
        "Re-indexed {} file(s), {} section(s) → {}",
        stats.files,
        stats.sections,
        out.display()
    );
    Ok(())
}

fn load_index(path: &Path) -> Result<VectorIndex> {
    let files = read_index_file(path)?;
    Ok(VectorIndex::from_files(&files)?)
}

fn open_assistant(config: &Config, index: Option<PathBuf>) -> Result<Assistant> {
    let path = resolve_index(index, config)?;
    let mut assistant = Assistant::from_config(config)?;
    assistant
        .initialize(&path)
        .with_context(|| format!("loading index {}", path.display()))?;
    Ok(assistant)
}

fn read_page(page: Option<&Path>) -> Result<String> {
    match page {
        Some(p) => {
            let html = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            Ok(browsing_content(&html))
        }
        None => Ok(String::new()),
    }
}

/// Streams one answer to stdout. Ctrl-C cancels it and keeps what arrived.
async fn ask_once(assistant: &mut Assistant, question: &str, page_text: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut printer = LivePrinter::default();
    let outcome = assistant
        .ask(question, page_text, cancel, |live, state| printer.update(live, state))
        .await;
    interrupt.abort();
    println!();

    let Some(outcome) = outcome? else {
        return Ok(());
    };
    match outcome.state {
        CompletionState::Failed => {
            if let Some(e) = outcome.error {
                eprintln!("error: {e}");
            }
        }
        CompletionState::Cancelled => eprintln!("(stopped)"),
        _ => {}
    }
    if !outcome.sources.is_empty() {
        let titles: Vec<_> = outcome.sources.iter().map(|s| s.section.title.as_str()).collect();
        tracing::info!(sources = ?titles, "answered");
    }
    Ok(())
}

async fn chat(assistant: &mut Assistant, page_text: &str) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        match line.trim() {
            "/quit" | "/exit" => return Ok(()),
            "/clear" => {
                assistant.clear()?;
                println!("(history cleared)");
            }
            "/history" => {
                for turn in assistant.conversation().visible_turns() {
                    match turn {
                        Turn::User { query, .. } => println!("you: {query}"),
                        Turn::Assistant { content } => println!("docent: {content}"),
                        Turn::Error { message } => println!("error: {message}"),
                        Turn::System { .. } => {}
                    }
                }
            }
            question => ask_once(assistant, question, page_text).await?,
        }
    }
}

/// Writes only the newly streamed part of the answer.
#[derive(Default)]
struct LivePrinter {
    printed: usize,
    announced_thinking: bool,
}

impl LivePrinter {
    fn update(&mut self, live: &LiveMessage, state: CompletionState) {
        if state == CompletionState::Reasoning && !self.announced_thinking {
            eprintln!("Thinking...");
            self.announced_thinking = true;
        }
        if let Some(new) = live.final_response.get(self.printed..) {
            if !new.is_empty() {
                print!("{new}");
                let _ = std::io::stdout().flush();
                self.printed = live.final_response.len();
            }
        }
    }
}
