//! Conversation state machine behind the interactive session.
//!
//! ```text
//!            select (valid)              success
//!   Idle ─────────────────► Processing ─────────► Ready
//!    ▲  ◄──────────────────────┘ failure            │
//!    └──────────────────── reset ◄──────────────────┘
//! ```
//!
//! [`Conversation`] does no I/O. The driver feeds it [`Event`]s and runs
//! whatever [`Effect`] comes back (an extraction or a PDF render), then feeds
//! the outcome back in as another event. Only one extraction is in flight at
//! a time: selections made while `Processing` are ignored.
//!
//! The message log is append-only; [`Event::Reset`] is the only way to
//! shorten it, and it goes back to exactly the greeting.

use crate::config::{Clock, ExtractionConfig};
use crate::output::Invoice;
use crate::pipeline::input::{display_size, validate_upload};
use crate::pipeline::invoice::format_amount;
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters of extracted text shown in the log before `...`.
pub const PREVIEW_CHARS: usize = 500;

pub const GREETING: &str = "👋 Bonjour ! Je suis votre assistant de facturation intelligent.\n\n\
📸 Envoyez-moi une image de:\n\
• Une conversation (commande par message)\n\
• Une note manuscrite\n\
• Une capture d'écran\n\n\
Je vais automatiquement extraire les informations et générer une facture PDF professionnelle pour vous!";

pub const PROCESSING_MESSAGE: &str =
    "🔍 Analyse de l'image en cours...\n⏳ Cela peut prendre quelques secondes...";
pub const ANALYSIS_DONE_MESSAGE: &str = "✨ Analyse terminée ! Voici les informations détectées:";
pub const PDF_PROMPT_MESSAGE: &str =
    "📄 Cliquez sur le bouton \"Générer PDF\" ci-dessous pour créer votre facture !";
pub const PDF_PROGRESS_MESSAGE: &str = "📄 Génération du PDF en cours...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Processing,
    Ready,
}

/// Something that happened outside the state machine.
#[derive(Debug, Clone)]
pub enum Event {
    /// The user picked a file.
    SelectImage {
        name: String,
        mime_type: String,
        size: usize,
    },
    ExtractionSucceeded {
        extracted_text: String,
        invoice: Invoice,
    },
    ExtractionFailed {
        message: String,
    },
    /// The user asked for the PDF.
    GenerateDocument,
    DocumentGenerated {
        file_name: String,
    },
    DocumentFailed {
        message: String,
    },
    /// "Nouvelle analyse".
    Reset,
}

/// Work the driver must perform after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    /// Run the extraction pipeline on the selected image.
    StartExtraction,
    /// Render this invoice.
    RenderDocument(Invoice),
}

pub struct Conversation {
    state: ChatState,
    messages: Vec<Message>,
    invoice: Option<Invoice>,
    selected_image: Option<String>,
    error: Option<String>,
    max_upload_bytes: usize,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("state", &self.state)
            .field("messages", &self.messages.len())
            .field("invoice", &self.invoice.as_ref().map(|i| &i.invoice_number))
            .field("error", &self.error)
            .finish()
    }
}

impl Conversation {
    pub fn new(clock: Arc<dyn Clock>, max_upload_bytes: usize) -> Self {
        let mut conversation = Self {
            state: ChatState::Idle,
            messages: Vec::new(),
            invoice: None,
            selected_image: None,
            error: None,
            max_upload_bytes,
            clock,
        };
        conversation.push(Sender::Bot, GREETING);
        conversation
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.clock.clone(), config.max_upload_bytes)
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn invoice(&self) -> Option<&Invoice> {
        self.invoice.as_ref()
    }

    /// The current validation or pipeline error, cleared by the next
    /// successful selection or by a reset.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn selected_image(&self) -> Option<&str> {
        self.selected_image.as_deref()
    }

    /// Apply one event and return the work it requires.
    pub fn handle(&mut self, event: Event) -> Effect {
        match event {
            Event::SelectImage {
                name,
                mime_type,
                size,
            } => self.select_image(name, &mime_type, size),
            Event::ExtractionSucceeded {
                extracted_text,
                invoice,
            } => {
                self.extraction_succeeded(&extracted_text, invoice);
                Effect::None
            }
            Event::ExtractionFailed { message } => {
                self.extraction_failed(message);
                Effect::None
            }
            Event::GenerateDocument => self.generate_document(),
            Event::DocumentGenerated { file_name } => {
                self.push(
                    Sender::Bot,
                    format!(
                        "✅ Facture PDF générée avec succès !\n📥 Le fichier \"{file_name}\" a été téléchargé."
                    ),
                );
                Effect::None
            }
            Event::DocumentFailed { message } => {
                // the invoice stays available for another attempt
                self.push(
                    Sender::Bot,
                    format!("❌ Erreur lors de la génération du PDF: {message}"),
                );
                Effect::None
            }
            Event::Reset => {
                self.reset();
                Effect::None
            }
        }
    }

    fn select_image(&mut self, name: String, mime_type: &str, size: usize) -> Effect {
        if self.state == ChatState::Processing {
            warn!("Image selected while an extraction is running; ignored");
            return Effect::None;
        }
        if let Err(e) = validate_upload(mime_type, size, self.max_upload_bytes) {
            debug!("Rejected selection '{}': {}", name, e);
            self.error = Some(e.to_string());
            return Effect::None;
        }

        self.error = None;
        self.invoice = None;
        self.push(
            Sender::User,
            format!("📷 Image sélectionnée: {} ({})", name, display_size(size)),
        );
        self.selected_image = Some(name);
        self.push(Sender::Bot, PROCESSING_MESSAGE);
        self.state = ChatState::Processing;
        Effect::StartExtraction
    }

    fn extraction_succeeded(&mut self, extracted_text: &str, invoice: Invoice) {
        if self.state != ChatState::Processing {
            warn!("Extraction result without a running extraction; ignored");
            return;
        }
        self.push(
            Sender::Bot,
            format!(
                "✅ Texte extrait avec succès !\n\n📝 **Texte détecté:**\n{}",
                preview(extracted_text)
            ),
        );
        self.push(Sender::Bot, ANALYSIS_DONE_MESSAGE);
        self.push(Sender::Bot, format_invoice_summary(&invoice));
        self.push(Sender::Bot, PDF_PROMPT_MESSAGE);
        self.invoice = Some(invoice);
        self.state = ChatState::Ready;
    }

    fn extraction_failed(&mut self, message: String) {
        if self.state != ChatState::Processing {
            warn!("Extraction failure without a running extraction; ignored");
            return;
        }
        self.push(Sender::Bot, format_error_message(&message));
        self.error = Some(message);
        self.state = ChatState::Idle;
    }

    fn generate_document(&mut self) -> Effect {
        if self.state != ChatState::Ready {
            return Effect::None;
        }
        let Some(invoice) = self.invoice.clone() else {
            return Effect::None;
        };
        self.push(Sender::Bot, PDF_PROGRESS_MESSAGE);
        Effect::RenderDocument(invoice)
    }

    fn reset(&mut self) {
        self.messages.truncate(1);
        self.invoice = None;
        self.selected_image = None;
        self.error = None;
        self.state = ChatState::Idle;
    }

    fn push(&mut self, sender: Sender, content: impl Into<String>) {
        self.messages.push(Message {
            sender,
            content: content.into(),
            timestamp: self.clock.now(),
        });
    }
}

/// First [`PREVIEW_CHARS`] characters, with `...` when cut.
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// The failure message with its troubleshooting suggestions.
pub fn format_error_message(details: &str) -> String {
    format!(
        "❌ Erreur lors du traitement de l'image.\n\n**Détails:** {details}\n\n\
💡 **Suggestions:**\n\
• Vérifiez que l'image est claire et lisible\n\
• Assurez-vous que le texte est visible\n\
• Essayez avec une autre image\n\
• Vérifiez votre connexion internet"
    )
}

/// Human-readable invoice summary posted after a successful analysis.
pub fn format_invoice_summary(invoice: &Invoice) -> String {
    let mut out = format!(
        "📋 **Facture N°:** {}\n📅 **Date:** {}\n\n👤 **Client:**\n- Nom: {}\n- Adresse: {}\n",
        invoice.invoice_number, invoice.date, invoice.customer_name, invoice.customer_address
    );
    if invoice.has_phone() {
        out.push_str(&format!("- Téléphone: {}\n", invoice.customer_phone));
    }

    out.push_str("\n🛍️ **Articles commandés:**\n");
    for (idx, item) in invoice.items.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {}\n   • Quantité: {}\n   • Prix unitaire: {}€\n   • Total: {}€\n",
            idx + 1,
            item.description,
            item.quantity,
            format_amount(item.unit_price),
            format_amount(item.total)
        ));
    }

    out.push_str(&format!(
        "\n💰 **Totaux:**\n- Sous-total HT: {}€\n- TVA (20%): {}€\n- **Total TTC: {}€**\n\n🚚 **Livraison:** {}",
        format_amount(invoice.subtotal),
        format_amount(invoice.tax),
        format_amount(invoice.total),
        invoice.delivery_time
    ));
    out
}
