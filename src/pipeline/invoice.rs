//! Invoice calculation: [`ExtractedOrder`] → [`Invoice`].
//!
//! Pure and deterministic for a given order and issue instant. Money is held
//! in [`Decimal`] so totals are exact; the only rounding is applied once, to
//! the tax amount, half away from zero at two decimals (`0.005 → 0.01`).
//! Line totals and the subtotal keep full precision.
//!
//! Every sum and product saturates at [`Decimal::MAX`]: a price or quantity
//! too large to total yields a capped invoice, never a panic.

use crate::output::{ExtractedOrder, Invoice, InvoiceLine, LineItem};
use chrono::{DateTime, FixedOffset};
use rust_decimal::{Decimal, RoundingStrategy};

/// VAT rate applied to the subtotal: 20 %.
pub const TAX_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 2);

/// Build the invoice for `order` issued at `issued_at`.
pub fn build_invoice(order: &ExtractedOrder, issued_at: DateTime<FixedOffset>) -> Invoice {
    let items: Vec<InvoiceLine> = order
        .items
        .iter()
        .map(|item| InvoiceLine {
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total: item.total(),
        })
        .collect();

    let subtotal = sum_amounts(items.iter().map(|line| line.total));
    let tax = compute_tax(subtotal);

    Invoice {
        invoice_number: invoice_number(issued_at),
        date: format_date(issued_at),
        customer_name: order.customer_name.clone(),
        customer_address: order.customer_address.clone(),
        customer_phone: order.customer_phone.clone(),
        items,
        delivery_time: order.delivery_time.clone(),
        subtotal,
        tax,
        total: saturating_add(subtotal, tax),
    }
}

/// Recompute every derived amount of an invoice received from outside.
///
/// Quantities below 1 and negative prices are clamped the same way the
/// normaliser clamps them; identity fields are kept as sent.
pub fn recalculate(invoice: Invoice) -> Invoice {
    let items: Vec<InvoiceLine> = invoice
        .items
        .into_iter()
        .map(|line| {
            let item = LineItem::new(line.description, line.quantity, line.unit_price);
            InvoiceLine {
                total: item.total(),
                description: item.description,
                quantity: item.quantity,
                unit_price: item.unit_price,
            }
        })
        .collect();
    let items = if items.is_empty() {
        vec![InvoiceLine {
            description: crate::pipeline::normalize::PLACEHOLDER_ITEM.to_string(),
            quantity: 1,
            unit_price: Decimal::ZERO,
            total: Decimal::ZERO,
        }]
    } else {
        items
    };

    let subtotal = sum_amounts(items.iter().map(|line| line.total));
    let tax = compute_tax(subtotal);
    Invoice {
        items,
        subtotal,
        tax,
        total: saturating_add(subtotal, tax),
        ..invoice
    }
}

/// `round(subtotal × 0.20, 2)`, midpoints rounded away from zero.
pub fn compute_tax(subtotal: Decimal) -> Decimal {
    subtotal
        .checked_mul(TAX_RATE)
        .unwrap_or(Decimal::MAX)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn saturating_add(a: Decimal, b: Decimal) -> Decimal {
    a.checked_add(b).unwrap_or(Decimal::MAX)
}

fn sum_amounts(amounts: impl Iterator<Item = Decimal>) -> Decimal {
    amounts.fold(Decimal::ZERO, saturating_add)
}

/// Two-decimal display form used on documents and summaries (`5.005 → "5.01"`).
pub fn format_amount(amount: Decimal) -> String {
    format!(
        "{:.2}",
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

/// `INV-` + the last 8 digits of the epoch-millisecond timestamp.
pub fn invoice_number(issued_at: DateTime<FixedOffset>) -> String {
    let millis = issued_at.timestamp_millis().to_string();
    let tail = &millis[millis.len().saturating_sub(8)..];
    format!("INV-{tail}")
}

/// French short date, `dd/mm/yyyy`, in the clock's offset.
pub fn format_date(issued_at: DateTime<FixedOffset>) -> String {
    issued_at.format("%d/%m/%Y").to_string()
}
