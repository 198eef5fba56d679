//! Integration tests for the image → invoice pipeline.
//!
//! Everything runs offline: model calls go to a scripted [`VisionModel`] or
//! to a `mockito` server standing in for the Generative Language API, and
//! invoices are stamped by a [`FixedClock`].
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use invoice_generator::pipeline::encode::ImagePayload;
use invoice_generator::pipeline::normalize::normalize_response;
use invoice_generator::{
    process_base64, process_file, write_invoice_pdf, ExtractionConfig,
    ExtractionProgressCallback, FixedClock, InvoiceError, ModelCallError, ProgressCallback,
    VisionModel,
};
use mockito::Matcher;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// 1×1 PNG.
const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

fn issued_at() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(2026, 3, 14, 9, 26, 53)
        .unwrap()
}

fn config(candidates: &[&str]) -> ExtractionConfig {
    ExtractionConfig::builder()
        .api_key("test-key")
        .candidates(candidates.iter().copied())
        .clock(Arc::new(FixedClock(issued_at())))
        .build()
        .unwrap()
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Each model name maps to a canned answer or error message.
struct ScriptedModel {
    script: Vec<(&'static str, Result<&'static str, &'static str>)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(script: Vec<(&'static str, Result<&'static str, &'static str>)>) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn generate(
        &self,
        model: &str,
        _image: &ImagePayload,
        prompt: &str,
    ) -> Result<String, ModelCallError> {
        assert!(prompt.contains("customerName"), "prompt must ask for the JSON keys");
        self.calls.lock().unwrap().push(model.to_string());
        match self.script.iter().find(|(name, _)| *name == model) {
            Some((_, Ok(text))) => Ok(text.to_string()),
            Some((_, Err(msg))) => Err(ModelCallError::new(*msg)),
            None => Err(ModelCallError::new("unscripted")),
        }
    }
}

const ORDER_JSON: &str = r#"```json
{
  "customerName": "Sophie Laurent",
  "customerAddress": "14 rue des Lilas, 69003 Lyon",
  "customerPhone": "06 12 34 56 78",
  "items": [
    {"description": "Gâteau chocolat", "quantity": 2, "unitPrice": 10.00, "details": "8 parts"},
    {"description": "Macarons", "quantity": "1", "unitPrice": "5.005"}
  ],
  "deliveryTime": "Samedi 10h",
  "extractedText": "Bonjour, 2 gâteaux chocolat 8 parts et des macarons pour samedi 10h"
}
```"#;

// ── Model fallback ───────────────────────────────────────────────────────────

#[tokio::test]
async fn fallback_reaches_second_candidate_and_builds_invoice() {
    let model = ScriptedModel::new(vec![
        ("a", Err("[404 Not Found] models/a is not found for API version v1beta")),
        ("b", Ok(ORDER_JSON)),
        ("c", Ok("{}")),
    ]);

    let out = process_base64(&model, "iVBORw0KGgo=", Some("image/png"), &config(&["a", "b", "c"]))
        .await
        .unwrap();

    assert_eq!(model.calls(), vec!["a", "b"]);
    assert_eq!(out.model, "b");

    let inv = &out.invoice;
    assert_eq!(inv.customer_name, "Sophie Laurent");
    assert_eq!(inv.customer_phone, "06 12 34 56 78");
    assert_eq!(inv.items.len(), 2);
    assert_eq!(inv.items[0].description, "Gâteau chocolat - 8 parts");
    assert_eq!(inv.items[0].total, dec("20"));
    assert_eq!(inv.items[1].quantity, 1);
    assert_eq!(inv.items[1].unit_price, dec("5.005"));
    assert_eq!(inv.subtotal, dec("25.005"));
    assert_eq!(inv.tax, dec("5.00"));
    assert_eq!(inv.total, dec("30.005"));
    assert_eq!(inv.date, "14/03/2026");
    assert!(inv.invoice_number.starts_with("INV-"));
    assert_eq!(inv.invoice_number.len(), 12);
    assert!(out.extracted_text.starts_with("Bonjour, 2 gâteaux"));
}

#[tokio::test]
async fn quota_error_aborts_without_trying_next() {
    let model = ScriptedModel::new(vec![
        ("a", Err("[429 Too Many Requests] Resource has been exhausted")),
        ("b", Ok(ORDER_JSON)),
    ]);
    let err = process_base64(&model, "AAAA", None, &config(&["a", "b"]))
        .await
        .unwrap_err();
    assert!(matches!(err, InvoiceError::ModelCallFailed { ref model, .. } if model == "a"));
    assert_eq!(model.calls(), vec!["a"]);
}

#[tokio::test]
async fn every_candidate_unavailable_gives_guidance() {
    let model = ScriptedModel::new(vec![
        ("a", Err("model not found")),
        ("b", Err("gemini-pro-vision is not supported for generateContent")),
    ]);
    let err = process_base64(&model, "AAAA", None, &config(&["a", "b"]))
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("not supported for generateContent"), "got: {msg}");
    assert!(msg.contains("vérifier la clé API"), "got: {msg}");
    assert_eq!(model.calls(), vec!["a", "b"]);
}

// ── Normalizer robustness ────────────────────────────────────────────────────

#[test]
fn malformed_answers_always_yield_a_usable_order() {
    let samples = [
        "",
        "   ",
        "Désolé, je ne peux pas lire cette image.",
        "```json\n{ pas du json }\n```",
        "Voici: {\"customerName\": \"Luc\", \"items\": \"deux pizzas\"} merci",
        "{\"items\": [null, 42, \"Pizza\", {\"quantity\": -3, \"unitPrice\": \"abc\"}]}",
        "[1, 2, 3]",
        "{\"customerName\": null, \"items\": []}",
        "}{",
    ];

    for raw in samples {
        let order = normalize_response(raw);
        assert!(!order.items.is_empty(), "no items for {raw:?}");
        assert!(!order.customer_name.is_empty(), "no name for {raw:?}");
        assert!(!order.customer_address.is_empty(), "no address for {raw:?}");
        assert!(!order.customer_phone.is_empty(), "no phone for {raw:?}");
        assert!(!order.delivery_time.is_empty(), "no delivery for {raw:?}");
        for item in &order.items {
            assert!(item.quantity >= 1, "quantity {} for {raw:?}", item.quantity);
            assert!(item.unit_price >= Decimal::ZERO, "price for {raw:?}");
            assert!(!item.description.is_empty(), "description for {raw:?}");
        }
    }
}

#[test]
fn json_embedded_in_prose_is_recovered() {
    let order = normalize_response(
        "Voici la commande extraite : {\"customerName\": \"Luc\", \"items\": [{\"description\": \"Pizza\", \"quantity\": 2, \"unitPrice\": 9.5}]} Bonne journée !",
    );
    assert_eq!(order.customer_name, "Luc");
    assert_eq!(order.items[0].description, "Pizza");
    assert_eq!(order.items[0].quantity, 2);
}

#[tokio::test]
async fn extreme_amounts_cap_the_invoice_instead_of_failing() {
    let answers = [
        r#"{"items":[{"quantity":1,"unitPrice":"79228162514264337593543950335"}]}"#,
        r#"{"items":[{"quantity":1,"unitPrice":"79228162514264337593543950335"},{"quantity":1,"unitPrice":"79228162514264337593543950335"}]}"#,
        r#"{"items":[{"quantity":99999999999,"unitPrice":1e20}]}"#,
    ];
    for answer in answers {
        let model = ScriptedModel::new(vec![("a", Ok(answer))]);
        let out = process_base64(&model, "iVBORw0KGgo=", Some("image/png"), &config(&["a"]))
            .await
            .unwrap();
        assert_eq!(out.invoice.total, Decimal::MAX, "answer: {answer}");
        assert!(out.invoice.subtotal <= out.invoice.total);

        let dir = tempfile::tempdir().unwrap();
        let path = write_invoice_pdf(&out.invoice, dir.path()).await.unwrap();
        assert!(std::fs::read(path).unwrap().starts_with(b"%PDF"));
    }
}

#[test]
fn max_quantity_from_model_is_clamped_to_u32() {
    let order = normalize_response(r#"{"items":[{"quantity":"99999999999 cartons","unitPrice":"2"}]}"#);
    assert_eq!(order.items[0].quantity, u32::MAX);
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for RecordingCallback {
    fn on_extraction_start(&self, total_candidates: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("start {total_candidates}"));
    }
    fn on_candidate_start(&self, model: &str, index: usize, _total: usize) {
        self.events.lock().unwrap().push(format!("try {model} {index}"));
    }
    fn on_candidate_error(&self, model: &str, _error: &str, falls_back: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("fail {model} {falls_back}"));
    }
    fn on_candidate_success(&self, model: &str, _response_len: usize) {
        self.events.lock().unwrap().push(format!("ok {model}"));
    }
}

#[tokio::test]
async fn progress_callback_sees_each_attempt() {
    let recorder = Arc::new(RecordingCallback::default());
    let mut cfg = config(&["a", "b"]);
    cfg.progress_callback = Some(recorder.clone() as ProgressCallback);

    let model = ScriptedModel::new(vec![("a", Err("not found")), ("b", Ok("{}"))]);
    process_base64(&model, "AAAA", None, &cfg).await.unwrap();

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec!["start 2", "try a 0", "fail a true", "try b 1", "ok b"]
    );
}

// ── Real client against a mock upstream ──────────────────────────────────────

#[tokio::test]
async fn file_to_pdf_through_mock_gemini() {
    let mut server = mockito::Server::new_async().await;
    let generate = server
        .mock("POST", "/models/gemini-1.5-flash:generateContent")
        .match_header("x-goog-api-key", "test-key")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "contents": [{ "parts": [{ "inline_data": { "mime_type": "image/png" } }] }]
        })))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": ORDER_JSON }] } }]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("commande.png");
    std::fs::write(&image, PNG_1X1).unwrap();

    let cfg = ExtractionConfig::builder()
        .api_key("test-key")
        .model("gemini-1.5-flash")
        .api_base_url(server.url())
        .clock(Arc::new(FixedClock(issued_at())))
        .build()
        .unwrap();

    let out = process_file(&image, &cfg).await.unwrap();
    generate.assert_async().await;
    assert_eq!(out.invoice.total, dec("30.005"));

    let pdf = write_invoice_pdf(&out.invoice, dir.path()).await.unwrap();
    let name = pdf.file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(
        name,
        format!("Facture_{}_Sophie_Laurent.pdf", out.invoice.invoice_number)
    );
    let doc = lopdf::Document::load(&pdf).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
}

#[tokio::test]
async fn oversize_file_never_reaches_upstream() {
    let mut server = mockito::Server::new_async().await;
    let never = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("huge.png");
    let mut bytes = PNG_1X1.to_vec();
    bytes.resize(5 * 1024 * 1024 + 1, 0);
    std::fs::write(&image, bytes).unwrap();

    let cfg = ExtractionConfig::builder()
        .api_key("test-key")
        .api_base_url(server.url())
        .build()
        .unwrap();

    let err = process_file(&image, &cfg).await.unwrap_err();
    assert!(matches!(err, InvoiceError::ImageTooLarge { .. }));
    never.assert_async().await;
}

#[tokio::test]
async fn missing_key_is_reported_for_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("ok.png");
    std::fs::write(&image, PNG_1X1).unwrap();

    let cfg = ExtractionConfig::builder().build().unwrap();
    let err = process_file(&image, &cfg).await.unwrap_err();
    assert!(matches!(err, InvoiceError::MissingApiKey));
}
