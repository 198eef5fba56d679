//! Values produced by the pipeline.
//!
//! Lifecycle: raw model text → [`ExtractedOrder`] (normaliser) →
//! [`Invoice`] (calculator). Each stage returns a new value; nothing is
//! mutated after construction. JSON field names are camelCase to match the
//! HTTP API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Placeholder customer name.
pub const DEFAULT_CUSTOMER_NAME: &str = "Client";
/// Placeholder address when the model's answer had no address.
pub const DEFAULT_CUSTOMER_ADDRESS: &str = "Adresse non spécifiée";
/// Placeholder address when the model's answer could not be parsed at all.
pub const UNPARSED_CUSTOMER_ADDRESS: &str = "Adresse non trouvée";
/// Placeholder phone; also the sentinel for "no phone" in summaries and PDFs.
pub const DEFAULT_CUSTOMER_PHONE: &str = "N/A";
/// Placeholder delivery time.
pub const DEFAULT_DELIVERY_TIME: &str = "À confirmer";

/// One ordered product or service entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Description, with the model's `details` already appended.
    pub description: String,
    /// Always ≥ 1.
    pub quantity: u32,
    /// Always ≥ 0.
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity: quantity.max(1),
            unit_price: unit_price.max(Decimal::ZERO),
        }
    }

    /// `quantity × unit_price`, never read from model output. Saturates at
    /// [`Decimal::MAX`] instead of overflowing.
    pub fn total(&self) -> Decimal {
        Decimal::from(self.quantity)
            .checked_mul(self.unit_price)
            .unwrap_or(Decimal::MAX)
    }
}

/// Order data recovered from the model's answer.
///
/// `items` is never empty and every text field is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedOrder {
    pub customer_name: String,
    pub customer_address: String,
    pub customer_phone: String,
    pub items: Vec<LineItem>,
    pub delivery_time: String,
    /// Text the model read from the image, or its whole raw answer when it
    /// did not provide one.
    pub raw_extracted_text: String,
}

/// A line item with its computed total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

/// A computed invoice, ready for display or rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// `INV-` followed by the last 8 digits of the issue timestamp (ms).
    pub invoice_number: String,
    /// Issue date, `dd/mm/yyyy`.
    pub date: String,
    pub customer_name: String,
    pub customer_address: String,
    pub customer_phone: String,
    pub items: Vec<InvoiceLine>,
    pub delivery_time: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl Invoice {
    /// True when the phone is a real number rather than the `N/A` sentinel.
    pub fn has_phone(&self) -> bool {
        self.customer_phone != DEFAULT_CUSTOMER_PHONE
    }
}

/// Result of a full image → invoice run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutput {
    /// Candidate model that produced the answer.
    pub model: String,
    /// Text shown to the user as "what was read".
    pub extracted_text: String,
    /// Unmodified model answer.
    pub raw_response: String,
    pub order: ExtractedOrder,
    pub invoice: Invoice,
}

/// One entry of the upstream model catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub supported_methods: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_item_clamps_invariants() {
        let item = LineItem::new("Pizza", 0, Decimal::new(-5, 0));
        assert_eq!(item.quantity, 1);
        assert_eq!(item.unit_price, Decimal::ZERO);
    }

    #[test]
    fn line_item_total_is_exact() {
        let item = LineItem::new("Stylo", 3, Decimal::new(1999, 3));
        assert_eq!(item.total(), Decimal::new(5997, 3));
    }

    #[test]
    fn invoice_serialises_camel_case_numbers() {
        let invoice = Invoice {
            invoice_number: "INV-12345678".into(),
            date: "01/02/2026".into(),
            customer_name: "Marie".into(),
            customer_address: "1 rue de Paris".into(),
            customer_phone: "N/A".into(),
            items: vec![InvoiceLine {
                description: "Tarte".into(),
                quantity: 2,
                unit_price: Decimal::new(1050, 2),
                total: Decimal::new(2100, 2),
            }],
            delivery_time: "Demain".into(),
            subtotal: Decimal::new(2100, 2),
            tax: Decimal::new(420, 2),
            total: Decimal::new(2520, 2),
        };
        let json = serde_json::to_value(&invoice).unwrap();
        assert_eq!(json["invoiceNumber"], "INV-12345678");
        assert_eq!(json["items"][0]["unitPrice"], 10.5);
        assert_eq!(json["total"], 25.2);
        assert!(!invoice.has_phone());
    }
}
