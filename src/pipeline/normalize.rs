//! Response normalisation: free-form model text → [`ExtractedOrder`].
//!
//! Models are asked for bare JSON but regularly wrap it in code fences, add a
//! sentence of prose around it, or answer with no JSON at all. This stage
//! never fails. It runs an ordered chain of parse strategies, each a pure
//! `&str → Option<object>` function, and synthesises a placeholder order when
//! every strategy declines:
//!
//! 1. strip code-fence markers (```` ``` ```` / ```` ```json ````) and trim
//! 2. [`parse_strict`]: the cleaned text is one JSON object
//! 3. [`parse_brace_block`]: the outermost `{ … }` span is one JSON object
//! 4. [`unparsed_order`]: placeholder order carrying the raw text
//!
//! A parsed object then goes through field coercion: missing text fields get
//! defaults, `items` is replaced by one placeholder when it is not a
//! non-empty array, quantities and prices are coerced from numbers or
//! numeric-prefixed strings.

use crate::output::{
    ExtractedOrder, LineItem, DEFAULT_CUSTOMER_ADDRESS, DEFAULT_CUSTOMER_NAME,
    DEFAULT_CUSTOMER_PHONE, DEFAULT_DELIVERY_TIME, UNPARSED_CUSTOMER_ADDRESS,
};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::{debug, warn};

/// Description of the placeholder item when `items` is missing or invalid.
pub const PLACEHOLDER_ITEM: &str = "Article";
/// Description of the placeholder item when nothing could be parsed.
pub const UNPARSED_ITEM: &str = "Article détecté";

/// A single parse strategy: `Some(object)` on success, `None` for "try next".
pub type ParseStrategy = fn(&str) -> Option<Map<String, Value>>;

/// Strategies in the order they are attempted.
pub const PARSE_CHAIN: &[(&str, ParseStrategy)] = &[
    ("strict", parse_strict),
    ("brace_block", parse_brace_block),
];

/// Normalise a raw model answer. Always returns a usable order.
pub fn normalize_response(raw: &str) -> ExtractedOrder {
    let cleaned = strip_code_fences(raw);

    for (name, strategy) in PARSE_CHAIN {
        if let Some(object) = strategy(&cleaned) {
            debug!("Model response parsed with '{}' strategy", name);
            return order_from_object(&object, raw);
        }
        warn!("Parse strategy '{}' failed, trying next", name);
    }

    warn!("No JSON found in model response; using placeholder order");
    unparsed_order(raw)
}

// ── Step 1: code fences ──────────────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```(?:json)?\n?").unwrap());

/// Remove every code-fence marker and trim.
pub fn strip_code_fences(input: &str) -> String {
    RE_FENCE.replace_all(input, "").trim().to_string()
}

// ── Step 2: strict parse ─────────────────────────────────────────────────────

/// Parse the whole text as a JSON object.
pub fn parse_strict(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

// ── Step 3: brace block ──────────────────────────────────────────────────────

static RE_BRACE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Parse the span from the first `{` to the last `}` as a JSON object.
pub fn parse_brace_block(text: &str) -> Option<Map<String, Value>> {
    let block = RE_BRACE_BLOCK.find(text)?;
    parse_strict(block.as_str())
}

// ── Step 4: placeholder ──────────────────────────────────────────────────────

/// The order used when no JSON object could be recovered.
pub fn unparsed_order(raw: &str) -> ExtractedOrder {
    ExtractedOrder {
        customer_name: DEFAULT_CUSTOMER_NAME.to_string(),
        customer_address: UNPARSED_CUSTOMER_ADDRESS.to_string(),
        customer_phone: DEFAULT_CUSTOMER_PHONE.to_string(),
        items: vec![LineItem::new(UNPARSED_ITEM, 1, Decimal::ZERO)],
        delivery_time: DEFAULT_DELIVERY_TIME.to_string(),
        raw_extracted_text: raw.to_string(),
    }
}

// ── Field coercion ───────────────────────────────────────────────────────────

fn order_from_object(object: &Map<String, Value>, raw: &str) -> ExtractedOrder {
    let text = |key: &str, default: &str| {
        object
            .get(key)
            .and_then(text_value)
            .unwrap_or_else(|| default.to_string())
    };

    let items: Vec<LineItem> = match object.get("items") {
        Some(Value::Array(items)) if !items.is_empty() => items.iter().map(line_item).collect(),
        _ => {
            debug!("'items' missing or empty; using placeholder item");
            vec![LineItem::new(PLACEHOLDER_ITEM, 1, Decimal::ZERO)]
        }
    };

    ExtractedOrder {
        customer_name: text("customerName", DEFAULT_CUSTOMER_NAME),
        customer_address: text("customerAddress", DEFAULT_CUSTOMER_ADDRESS),
        customer_phone: text("customerPhone", DEFAULT_CUSTOMER_PHONE),
        items,
        delivery_time: text("deliveryTime", DEFAULT_DELIVERY_TIME),
        raw_extracted_text: text("extractedText", raw),
    }
}

fn line_item(value: &Value) -> LineItem {
    match value {
        Value::Object(item) => {
            let base = item
                .get("description")
                .and_then(text_value)
                .unwrap_or_else(|| PLACEHOLDER_ITEM.to_string());
            let description = match item.get("details").and_then(text_value) {
                Some(details) => format!("{base} - {details}"),
                None => base,
            };
            LineItem::new(
                description,
                item.get("quantity").map(coerce_quantity).unwrap_or(1),
                item.get("unitPrice")
                    .map(coerce_price)
                    .unwrap_or(Decimal::ZERO),
            )
        }
        other => LineItem::new(
            text_value(other).unwrap_or_else(|| PLACEHOLDER_ITEM.to_string()),
            1,
            Decimal::ZERO,
        ),
    }
}

/// A non-blank string, or a number rendered as text.
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer quantity ≥ 1; anything unparseable, zero or negative becomes 1.
pub fn coerce_quantity(value: &Value) -> u32 {
    let parsed: Option<i64> = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => leading_integer(s),
        _ => None,
    };
    match parsed {
        Some(q) if q >= 1 => u32::try_from(q).unwrap_or(u32::MAX),
        _ => 1,
    }
}

/// Decimal price ≥ 0; anything unparseable or negative becomes 0.
pub fn coerce_price(value: &Value) -> Decimal {
    let parsed = match value {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => leading_decimal(s),
        _ => None,
    };
    match parsed {
        Some(p) if p > Decimal::ZERO => p.normalize(),
        _ => Decimal::ZERO,
    }
}

static RE_LEADING_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([+-]?\d+)").unwrap());

static RE_LEADING_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([+-]?(?:\d+(?:[.,]\d*)?|[.,]\d+))").unwrap());

fn leading_integer(s: &str) -> Option<i64> {
    let caps = RE_LEADING_INT.captures(s)?;
    caps[1].parse::<i64>().ok()
}

/// Numeric prefix of `s`; a comma is accepted as the decimal separator.
fn leading_decimal(s: &str) -> Option<Decimal> {
    let caps = RE_LEADING_DECIMAL.captures(s)?;
    let number = caps[1].replace(',', ".");
    let number = number.trim_end_matches('.');
    let (sign, digits) = match number.strip_prefix(['+', '-']) {
        Some(rest) => (&number[..1], rest),
        None => ("", number),
    };
    let digits = if digits.starts_with('.') {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    Decimal::from_str(&format!("{}{digits}", sign.trim_start_matches('+'))).ok()
}

// ── Tests ────────────────────────────────────────────────────────────────────
