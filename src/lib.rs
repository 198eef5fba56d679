//! # invoice-generator
//!
//! Turn a photo of a handwritten order or a chat screenshot into a priced
//! invoice and a printable PDF, using a Gemini multimodal model to read the
//! image.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image
//!  │
//!  ├─ 1. Input      MIME must be image/*, size ≤ 5 MiB (no network before this)
//!  ├─ 2. Encode     bytes → base64 inline_data part
//!  ├─ 3. Invoke     candidate models in order; "not found" falls through,
//!  │                anything else aborts
//!  ├─ 4. Normalize  fences → strict JSON → {…} block → placeholder order
//!  ├─ 5. Invoice    line totals, subtotal, 20 % VAT (half-up), total
//!  └─ 6. Render     paginated A4 PDF
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_generator::{process_file, write_invoice_pdf, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // GOOGLE_API_KEY, optional GEMINI_MODEL
//!     let config = ExtractionConfig::from_env()?;
//!     let output = process_file("commande.jpg", &config).await?;
//!     println!("{} → {}", output.invoice.invoice_number, output.invoice.total);
//!     write_invoice_pdf(&output.invoice, ".").await?;
//!     Ok(())
//! }
//! ```
//!
//! Any [`VisionModel`] can stand in for Gemini, which is how the tests drive
//! the pipeline without network access.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoicegen` binary (clap + anyhow + tracing-subscriber + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chat;
pub mod config;
pub mod error;
pub mod gemini;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chat::{ChatState, Conversation, Effect, Event};
pub use config::{Clock, ExtractionConfig, ExtractionConfigBuilder, FixedClock, SystemClock};
pub use error::{InvoiceError, ModelCallError};
pub use gemini::GeminiClient;
pub use output::{ExtractedOrder, Invoice, InvoiceLine, LineItem, ModelInfo, ProcessOutput};
pub use pipeline::llm::{InvoiceBackend, ModelCatalog, VisionModel};
pub use process::{list_models, process_base64, process_file, process_image, write_invoice_pdf};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use server::{router, AppState};
