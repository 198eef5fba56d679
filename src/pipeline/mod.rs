//! Pipeline stages for image-to-invoice extraction.
//!
//! Each submodule implements exactly one transformation step and can be
//! tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm ──▶ normalize ──▶ invoice ──▶ render
//! (checks)  (base64)  (VLM)    (JSON repair)  (totals)    (PDF)
//! ```
//!
//! 1. [`input`]      validate MIME type and size before any network call
//! 2. [`encode`]     base64-wrap the image for the multimodal request body
//! 3. [`llm`]        walk the candidate models; the only stage with network I/O
//! 4. [`normalize`]  turn free-form model text into an [`crate::ExtractedOrder`]
//! 5. [`invoice`]    derive line totals, subtotal, tax and grand total
//! 6. [`render`]     lay the invoice out as a paginated PDF

pub mod encode;
pub mod input;
pub mod invoice;
pub mod llm;
pub mod normalize;
pub mod render;
