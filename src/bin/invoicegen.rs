//! CLI binary for invoice-generator.
//!
//! A thin shim over the library crate: maps subcommands and flags to
//! `ExtractionConfig`, runs the pipeline or the HTTP server, and prints
//! results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use invoice_generator::chat::{format_invoice_summary, Sender};
use invoice_generator::pipeline::input::{read_upload, sniff_mime_type};
use invoice_generator::pipeline::render::download_filename;
use invoice_generator::{
    list_models, process_file, process_image, write_invoice_pdf, AppState, Conversation, Effect,
    Event, ExtractionConfig, ExtractionProgressCallback, GeminiClient, ProgressCallback,
};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that follows the invoker down the candidate list.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading image…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_candidates: usize) {
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading image ({total_candidates} candidate model(s))…"))
        ));
    }

    fn on_candidate_start(&self, model: &str, index: usize, total: usize) {
        self.bar.set_message(format!("{model}  {}", dim(&format!("{}/{total}", index + 1))));
    }

    fn on_candidate_error(&self, model: &str, error: &str, falls_back: bool) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<24} {}{}",
            red("✗"),
            model,
            red(&msg),
            if falls_back { dim("  → next model") } else { String::new() }
        ));
        if !falls_back {
            self.bar.finish_and_clear();
        }
    }

    fn on_candidate_success(&self, model: &str, response_len: usize) {
        self.bar.println(format!(
            "  {} {:<24} {}  {}",
            green("✓"),
            model,
            dim(&format!("{response_len:>5} chars")),
            dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64())),
        ));
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Read an order photo and print the invoice
  invoicegen extract commande.jpg

  # Same, and write the PDF next to it
  invoicegen extract commande.jpg -o .

  # Machine-readable output
  invoicegen extract capture.png --json > facture.json

  # Start the HTTP API on port 8080
  invoicegen serve --bind 0.0.0.0:8080

  # Which Gemini models can this key use?
  invoicegen models

  # Interactive session
  invoicegen chat

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY          Google AI Studio API key (required for model calls)
  GEMINI_MODEL            Use only this model instead of the built-in fallback list
  GEMINI_API_BASE_URL     Override the Generative Language API root
  INVOICEGEN_BIND         Server bind address (default 127.0.0.1:3000)
  APP_ENV / ENVIRONMENT   "development" adds error chains to API error bodies
  RUST_LOG                Log filter, overrides -v / -q

  Variables are also read from .env.local and .env in the working directory.
"#;

/// Generate invoices from order photos and chat screenshots.
#[derive(Parser, Debug)]
#[command(
    name = "invoicegen",
    version,
    about = "Generate invoices from order photos and chat screenshots using Gemini",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Try only this model (overrides GEMINI_MODEL and the fallback list).
    #[arg(long, global = true)]
    model: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "INVOICEGEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "INVOICEGEN_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "INVOICEGEN_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "INVOICEGEN_BIND", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
    },
    /// Extract an invoice from one image.
    Extract {
        /// Image file (JPEG, PNG, WebP, GIF).
        image: PathBuf,

        /// Write the PDF here (a directory gets the default file name).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the full result as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// List the models visible to the API key.
    Models {
        #[arg(long)]
        json: bool,
    },
    /// Interactive session: type an image path, then `pdf`, `reset` or `quit`.
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env.local first so it wins over .env; neither overrides the real env.
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = matches!(cli.command, Command::Extract { json: false, .. })
        && !cli.quiet
        && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress || matches!(cli.command, Command::Chat) {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = ExtractionConfig::from_env().context("Invalid configuration")?;
    if let Some(model) = cli.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        config.candidates = vec![model.to_string()];
    }

    match cli.command {
        Command::Serve { bind } => {
            if config.api_key.is_none() {
                eprintln!(
                    "{} GOOGLE_API_KEY is not set; model routes will answer with an error",
                    cyan("⚠")
                );
            }
            let state = AppState::new(config).context("Failed to create API client")?;
            invoice_generator::server::serve(bind, state)
                .await
                .context("Server failed")?;
        }
        Command::Extract {
            image,
            output,
            json,
        } => {
            if show_progress {
                config.progress_callback =
                    Some(CliProgressCallback::new() as ProgressCallback);
            }
            run_extract(&image, output.as_deref(), json, cli.quiet, &config).await?;
        }
        Command::Models { json } => run_models(json, &config).await?,
        Command::Chat => run_chat(&config).await?,
    }

    Ok(())
}

async fn run_extract(
    image: &Path,
    output: Option<&Path>,
    json: bool,
    quiet: bool,
    config: &ExtractionConfig,
) -> Result<()> {
    let result = process_file(image, config)
        .await
        .with_context(|| format!("Extraction failed for {}", image.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise output")?
        );
    } else {
        println!("{}", format_invoice_summary(&result.invoice));
    }

    if let Some(output) = output {
        let path = write_invoice_pdf(&result.invoice, output)
            .await
            .context("Failed to write PDF")?;
        if !quiet {
            eprintln!(
                "{}  {}  via {}  →  {}",
                green("✔"),
                result.invoice.invoice_number,
                dim(&result.model),
                bold(&path.display().to_string())
            );
        }
    }
    Ok(())
}

async fn run_models(json: bool, config: &ExtractionConfig) -> Result<()> {
    let models = list_models(config)
        .await
        .context("Failed to list models")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&models).context("Failed to serialise models")?
        );
        return Ok(());
    }

    for m in &models {
        let methods = m
            .supported_methods
            .as_ref()
            .map(|v| v.join(", "))
            .unwrap_or_default();
        let vision = methods.contains("generateContent");
        println!(
            "{} {:<40} {}",
            if vision { green("✓") } else { dim("·") },
            m.name,
            dim(&m.display_name.clone().unwrap_or_default())
        );
        if !methods.is_empty() {
            println!("    {}", dim(&methods));
        }
    }
    eprintln!("{} model(s)", bold(&models.len().to_string()));
    Ok(())
}

// ── Interactive session ──────────────────────────────────────────────────────

async fn run_chat(config: &ExtractionConfig) -> Result<()> {
    let mut conversation = Conversation::from_config(config);
    let mut shown = 0;
    print_new_messages(&conversation, &mut shown);
    eprintln!(
        "{}",
        dim("Chemin d'une image pour l'analyser, « pdf » pour la facture, « reset » pour recommencer, « quit » pour sortir.")
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{} ", cyan("›"));
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "quit" | "exit" | "q" => break,
            "reset" | "nouvelle" => {
                conversation.handle(Event::Reset);
                shown = 0;
            }
            "pdf" => {
                if let Effect::RenderDocument(invoice) = conversation.handle(Event::GenerateDocument) {
                    print_new_messages(&conversation, &mut shown);
                    let event = match write_invoice_pdf(&invoice, ".").await {
                        Ok(path) => Event::DocumentGenerated {
                            file_name: path
                                .file_name()
                                .map(|n| n.to_string_lossy().into_owned())
                                .unwrap_or_else(|| download_filename(&invoice)),
                        },
                        Err(e) => Event::DocumentFailed {
                            message: e.to_string(),
                        },
                    };
                    conversation.handle(event);
                } else {
                    eprintln!("{}", dim("Aucune facture à générer pour l'instant."));
                }
            }
            path => {
                let path = PathBuf::from(path);
                let selection = match describe_file(&path).await {
                    Ok(event) => event,
                    Err(e) => {
                        eprintln!("{} {}", red("✗"), e);
                        continue;
                    }
                };
                if conversation.handle(selection) == Effect::StartExtraction {
                    print_new_messages(&conversation, &mut shown);
                    let event = match extract_for_chat(&path, config).await {
                        Ok(out) => Event::ExtractionSucceeded {
                            extracted_text: out.extracted_text,
                            invoice: out.invoice,
                        },
                        Err(e) => Event::ExtractionFailed {
                            message: e.to_string(),
                        },
                    };
                    conversation.handle(event);
                } else if let Some(err) = conversation.error() {
                    eprintln!("{} {}", red("✗"), err);
                }
            }
        }
        print_new_messages(&conversation, &mut shown);
    }
    Ok(())
}

/// Name, sniffed MIME type and size, without reading the whole file.
async fn describe_file(path: &Path) -> Result<Event> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Fichier introuvable: {}", path.display()))?;
    let mut head = Vec::with_capacity(64);
    tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Impossible d'ouvrir {}", path.display()))?
        .take(64)
        .read_to_end(&mut head)
        .await
        .context("Failed to read file header")?;

    Ok(Event::SelectImage {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        mime_type: sniff_mime_type(&head, path),
        size: usize::try_from(meta.len()).unwrap_or(usize::MAX),
    })
}

async fn extract_for_chat(
    path: &Path,
    config: &ExtractionConfig,
) -> Result<invoice_generator::ProcessOutput, invoice_generator::InvoiceError> {
    let upload = read_upload(path, config.max_upload_bytes).await?;
    let client = GeminiClient::from_config(config)?;
    process_image(&client, &upload, config).await
}

fn print_new_messages(conversation: &Conversation, shown: &mut usize) {
    for message in conversation.messages().iter().skip(*shown) {
        let time = message.timestamp.format("%H:%M").to_string();
        match message.sender {
            Sender::Bot => println!("{} {}\n{}\n", cyan("●"), dim(&time), message.content),
            Sender::User => println!("{} {}\n{}\n", bold("›"), dim(&time), dim(&message.content)),
        }
    }
    *shown = conversation.messages().len();
}
