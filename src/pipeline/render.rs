//! Document rendering: [`Invoice`] → paginated A4 PDF.
//!
//! Rendering is split in two so the layout can be tested without parsing PDF:
//!
//! 1. [`layout_invoice`] walks the invoice top-down in millimetres and emits
//!    a list of [`DrawOp`]s per page. All pagination decisions happen here.
//! 2. [`encode_pdf`] turns those pages into PDF content streams with lopdf,
//!    using the two built-in Helvetica fonts (no font files needed).
//!
//! ## Layout
//!
//! Header band → invoice number and date → boxed client block → item table
//! (Description / Qté / P.U. (€) / Total (€)) → totals (Sous-total HT, TVA,
//! TOTAL TTC in bold on a shaded band) → delivery line. A footer is drawn on
//! every page. Before each row the remaining height is checked and a new page
//! (with a repeated table header) is started when the row would not fit.

use crate::error::InvoiceError;
use crate::output::Invoice;
use crate::pipeline::invoice::format_amount;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use once_cell::sync::Lazy;
use regex::Regex;

// ── Page geometry (millimetres, origin top-left) ─────────────────────────────

pub const PAGE_WIDTH: f32 = 210.0;
pub const PAGE_HEIGHT: f32 = 297.0;
/// Rows must end above `PAGE_HEIGHT - BOTTOM_MARGIN`; the footer lives below.
pub const BOTTOM_MARGIN: f32 = 30.0;
/// Cursor position at the top of a continuation page.
pub const CONTINUATION_TOP: f32 = 20.0;

const LEFT: f32 = 20.0;
const CONTENT_WIDTH: f32 = 170.0;
const TABLE_HEADER_HEIGHT: f32 = 10.0;
const DESCRIPTION_WIDTH: f32 = 85.0;
const ROW_LINE_HEIGHT: f32 = 5.0;
const ROW_MIN_HEIGHT: f32 = 8.0;
const ROW_GAP: f32 = 5.0;
const TOTALS_BLOCK_HEIGHT: f32 = 42.0;

/// Column x positions: description (left edge), then right edges.
const COL_DESCRIPTION: f32 = 25.0;
const COL_QUANTITY_RIGHT: f32 = 125.0;
const COL_UNIT_PRICE_RIGHT: f32 = 155.0;
const COL_TOTAL_RIGHT: f32 = 180.0;

const BRAND: Rgb = Rgb(41, 128, 185);
const BLACK: Rgb = Rgb(0, 0, 0);
const WHITE: Rgb = Rgb(255, 255, 255);
const GREY: Rgb = Rgb(128, 128, 128);
const RULE: Rgb = Rgb(200, 200, 200);
const SHADE: Rgb = Rgb(240, 240, 240);

const MM_TO_PT: f32 = 72.0 / 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// One drawing instruction, coordinates in millimetres from the top-left.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        color: Rgb,
        align: Align,
        text: String,
    },
    FillRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Rgb,
    },
    StrokeRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Rgb,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        color: Rgb,
    },
}

impl DrawOp {
    /// The text of a `Text` op, `None` otherwise.
    pub fn text(&self) -> Option<&str> {
        match self {
            DrawOp::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// True when a block of `height` starting at `cursor` would cross the
/// bottom margin, i.e. it must go on a new page.
pub fn needs_page_break(cursor: f32, height: f32) -> bool {
    cursor + height > PAGE_HEIGHT - BOTTOM_MARGIN
}

/// Render an invoice to PDF bytes.
pub fn render_invoice_pdf(invoice: &Invoice) -> Result<Vec<u8>, InvoiceError> {
    encode_pdf(&layout_invoice(invoice), &format!("Facture {}", invoice.invoice_number))
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// `Facture_<invoiceNumber>_<customerName>.pdf`, whitespace runs in the name
/// replaced by `_`. Path separators and quotes are replaced too so the name is
/// safe on disk and in a `Content-Disposition` header.
pub fn download_filename(invoice: &Invoice) -> String {
    let name = RE_WHITESPACE.replace_all(&invoice.customer_name, "_");
    let name = name.replace(['/', '\\', '"'], "_");
    format!("Facture_{}_{}.pdf", invoice.invoice_number, name)
}

// ── Layout ───────────────────────────────────────────────────────────────────

struct Pages {
    pages: Vec<Vec<DrawOp>>,
}

impl Pages {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
        }
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.push(op);
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
    }

    fn text(&mut self, x: f32, y: f32, size: f32, bold: bool, color: Rgb, align: Align, text: impl Into<String>) {
        self.push(DrawOp::Text {
            x,
            y,
            size,
            bold,
            color,
            align,
            text: text.into(),
        });
    }
}

/// Lay the invoice out page by page.
pub fn layout_invoice(invoice: &Invoice) -> Vec<Vec<DrawOp>> {
    let mut p = Pages::new();

    // Header band
    p.push(DrawOp::FillRect {
        x: 0.0,
        y: 0.0,
        w: PAGE_WIDTH,
        h: 40.0,
        color: BRAND,
    });
    p.text(PAGE_WIDTH / 2.0, 25.0, 28.0, true, WHITE, Align::Center, "FACTURE");
    p.text(LEFT, 50.0, 10.0, false, BLACK, Align::Left, format!("N° de Facture: {}", invoice.invoice_number));
    p.text(LEFT, 57.0, 10.0, false, BLACK, Align::Left, format!("Date d'émission: {}", invoice.date));

    // Client block
    let box_top = 65.0;
    p.text(25.0, 73.0, 12.0, true, BLACK, Align::Left, "INFORMATIONS CLIENT");
    let mut y = 80.0;
    let mut client_lines = vec![
        format!("Nom: {}", invoice.customer_name),
        format!("Adresse: {}", invoice.customer_address),
    ];
    if invoice.has_phone() {
        client_lines.push(format!("Téléphone: {}", invoice.customer_phone));
    }
    for line in client_lines {
        for wrapped in wrap_text(&line, 160.0, 10.0, false) {
            p.text(25.0, y, 10.0, false, BLACK, Align::Left, wrapped);
            y += 7.0;
        }
    }
    let box_height = (y - box_top - 2.0).max(35.0);
    p.push(DrawOp::StrokeRect {
        x: LEFT,
        y: box_top,
        w: CONTENT_WIDTH,
        h: box_height,
        color: BRAND,
    });

    // Item table
    let table_top = (box_top + box_height + 10.0).max(110.0);
    table_header(&mut p, table_top);
    let mut cursor = table_top + TABLE_HEADER_HEIGHT + 5.0;

    for item in &invoice.items {
        let lines = wrap_text(&item.description, DESCRIPTION_WIDTH, 10.0, false);
        let body = (lines.len() as f32 * ROW_LINE_HEIGHT).max(ROW_MIN_HEIGHT);

        if needs_page_break(cursor, body + ROW_GAP) {
            p.new_page();
            table_header(&mut p, CONTINUATION_TOP);
            cursor = CONTINUATION_TOP + TABLE_HEADER_HEIGHT + 5.0;
        }

        for (i, line) in lines.iter().enumerate() {
            let line_y = cursor + i as f32 * ROW_LINE_HEIGHT;
            p.text(COL_DESCRIPTION, line_y, 10.0, false, BLACK, Align::Left, line.clone());
        }
        p.text(COL_QUANTITY_RIGHT, cursor, 10.0, false, BLACK, Align::Right, item.quantity.to_string());
        p.text(COL_UNIT_PRICE_RIGHT, cursor, 10.0, false, BLACK, Align::Right, format_amount(item.unit_price));
        p.text(COL_TOTAL_RIGHT, cursor, 10.0, false, BLACK, Align::Right, format_amount(item.total));

        cursor += body;
        p.push(DrawOp::Line {
            x1: LEFT,
            y1: cursor,
            x2: LEFT + CONTENT_WIDTH,
            y2: cursor,
            color: RULE,
        });
        cursor += ROW_GAP;
    }

    // Totals
    if needs_page_break(cursor, TOTALS_BLOCK_HEIGHT) {
        p.new_page();
        cursor = CONTINUATION_TOP;
    }
    cursor += 5.0;
    p.text(140.0, cursor, 10.0, false, BLACK, Align::Left, "Sous-total HT:");
    p.text(COL_TOTAL_RIGHT, cursor, 10.0, false, BLACK, Align::Right, format!("{}€", format_amount(invoice.subtotal)));
    cursor += 7.0;
    p.text(140.0, cursor, 10.0, false, BLACK, Align::Left, "TVA (20%):");
    p.text(COL_TOTAL_RIGHT, cursor, 10.0, false, BLACK, Align::Right, format!("{}€", format_amount(invoice.tax)));
    cursor += 10.0;
    p.push(DrawOp::FillRect {
        x: 135.0,
        y: cursor - 6.0,
        w: 55.0,
        h: 10.0,
        color: SHADE,
    });
    p.text(140.0, cursor, 12.0, true, BLACK, Align::Left, "TOTAL TTC:");
    p.text(COL_TOTAL_RIGHT, cursor, 12.0, true, BRAND, Align::Right, format!("{}€", format_amount(invoice.total)));
    cursor += 15.0;
    p.text(LEFT, cursor, 10.0, false, BLACK, Align::Left, format!("Délai de livraison: {}", invoice.delivery_time));

    // Footer on every page
    let total_pages = p.pages.len();
    for (index, page) in p.pages.iter_mut().enumerate() {
        let footer_y = PAGE_HEIGHT - 20.0;
        for (dy, text) in [
            (0.0, "Merci pour votre confiance !".to_string()),
            (5.0, "Document généré automatiquement par IA".to_string()),
        ] {
            page.push(footer(footer_y + dy, text));
        }
        if total_pages > 1 {
            page.push(DrawOp::Text {
                x: LEFT + CONTENT_WIDTH,
                y: footer_y + 5.0,
                size: 8.0,
                bold: false,
                color: GREY,
                align: Align::Right,
                text: format!("{}/{}", index + 1, total_pages),
            });
        }
    }

    p.pages
}

fn footer(y: f32, text: String) -> DrawOp {
    DrawOp::Text {
        x: PAGE_WIDTH / 2.0,
        y,
        size: 8.0,
        bold: false,
        color: GREY,
        align: Align::Center,
        text,
    }
}

fn table_header(p: &mut Pages, top: f32) {
    p.push(DrawOp::FillRect {
        x: LEFT,
        y: top,
        w: CONTENT_WIDTH,
        h: TABLE_HEADER_HEIGHT,
        color: BRAND,
    });
    let baseline = top + 7.0;
    p.text(COL_DESCRIPTION, baseline, 10.0, true, WHITE, Align::Left, "Description");
    p.text(120.0, baseline, 10.0, true, WHITE, Align::Left, "Qté");
    p.text(140.0, baseline, 10.0, true, WHITE, Align::Left, "P.U. (€)");
    p.text(165.0, baseline, 10.0, true, WHITE, Align::Left, "Total (€)");
}

// ── Text metrics ─────────────────────────────────────────────────────────────

/// Helvetica advance widths (1/1000 em) for ASCII 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Approximate rendered width in millimetres.
pub fn text_width(text: &str, size: f32, bold: bool) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| match c as u32 {
            code @ 32..=126 => HELVETICA_WIDTHS[(code - 32) as usize] as u32,
            _ => 556,
        })
        .sum();
    let factor = if bold { 1.07 } else { 1.0 };
    units as f32 / 1000.0 * size * factor / MM_TO_PT
}

/// Greedy word wrap to `max_width` millimetres. Words longer than a line
/// are split by character. Always returns at least one line.
pub fn wrap_text(text: &str, max_width: f32, size: f32, bold: bool) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate, size, bold) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if text_width(word, size, bold) <= max_width {
            current = word.to_string();
        } else {
            for ch in word.chars() {
                current.push(ch);
                if text_width(&current, size, bold) > max_width && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(ch);
                }
            }
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Encode text for a WinAnsiEncoding font; unmappable characters become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => b'?',
        })
        .collect()
}

// ── PDF encoding ─────────────────────────────────────────────────────────────

/// Serialise laid-out pages into a PDF document.
pub fn encode_pdf(pages: &[Vec<DrawOp>], title: &str) -> Result<Vec<u8>, InvoiceError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for ops in pages {
        let content: Content<Vec<Operation>> = Content {
            operations: ops.iter().flat_map(pdf_operations).collect(),
        };
        let encoded = content
            .encode()
            .map_err(|e| InvoiceError::RenderFailed(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), real(pt(PAGE_WIDTH)), real(pt(PAGE_HEIGHT))],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(encode_win_ansi(title)),
        "Producer" => Object::string_literal("invoice-generator"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| InvoiceError::RenderFailed(e.to_string()))?;
    Ok(buf)
}

fn real(v: f32) -> Object {
    Object::Real(v.into())
}

fn pt(mm: f32) -> f32 {
    mm * MM_TO_PT
}

/// Convert a top-left millimetre y into a bottom-left point y.
fn flip(y: f32) -> f32 {
    pt(PAGE_HEIGHT - y)
}

fn color_operands(c: Rgb) -> Vec<Object> {
    [c.0, c.1, c.2]
        .iter()
        .map(|v| real(*v as f32 / 255.0))
        .collect()
}

fn pdf_operations(op: &DrawOp) -> Vec<Operation> {
    match op {
        DrawOp::Text {
            x,
            y,
            size,
            bold,
            color,
            align,
            text,
        } => {
            let width = text_width(text, *size, *bold);
            let left = match align {
                Align::Left => *x,
                Align::Center => *x - width / 2.0,
                Align::Right => *x - width,
            };
            let font = if *bold { "F2" } else { "F1" };
            vec![
                Operation::new("rg", color_operands(*color)),
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![font.into(), real(*size)]),
                Operation::new("Td", vec![real(pt(left)), real(flip(*y))]),
                Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(text))]),
                Operation::new("ET", vec![]),
            ]
        }
        DrawOp::FillRect { x, y, w, h, color } => vec![
            Operation::new("rg", color_operands(*color)),
            Operation::new(
                "re",
                vec![real(pt(*x)), real(flip(*y + *h)), real(pt(*w)), real(pt(*h))],
            ),
            Operation::new("f", vec![]),
        ],
        DrawOp::StrokeRect { x, y, w, h, color } => vec![
            Operation::new("RG", color_operands(*color)),
            Operation::new("w", vec![real(pt(0.5))]),
            Operation::new(
                "re",
                vec![real(pt(*x)), real(flip(*y + *h)), real(pt(*w)), real(pt(*h))],
            ),
            Operation::new("S", vec![]),
        ],
        DrawOp::Line {
            x1,
            y1,
            x2,
            y2,
            color,
        } => vec![
            Operation::new("RG", color_operands(*color)),
            Operation::new("w", vec![real(pt(0.2))]),
            Operation::new("m", vec![real(pt(*x1)), real(flip(*y1))]),
            Operation::new("l", vec![real(pt(*x2)), real(flip(*y2))]),
            Operation::new("S", vec![]),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::InvoiceLine;
    use rust_decimal::Decimal;

    fn invoice(items: usize, description: &str) -> Invoice {
        let lines: Vec<InvoiceLine> = (0..items)
            .map(|i| InvoiceLine {
                description: format!("{description} {}", i + 1),
                quantity: 1,
                unit_price: Decimal::new(250, 2),
                total: Decimal::new(250, 2),
            })
            .collect();
        let subtotal = Decimal::new(250, 2) * Decimal::from(items as u32);
        Invoice {
            invoice_number: "INV-00001234".into(),
            date: "05/06/2026".into(),
            customer_name: "Camille  Rousseau".into(),
            customer_address: "8 avenue Foch, 75016 Paris".into(),
            customer_phone: "N/A".into(),
            items: lines,
            delivery_time: "Vendredi".into(),
            subtotal,
            tax: crate::pipeline::invoice::compute_tax(subtotal),
            total: subtotal + crate::pipeline::invoice::compute_tax(subtotal),
        }
    }

    fn texts(page: &[DrawOp]) -> Vec<&str> {
        page.iter().filter_map(DrawOp::text).collect()
    }

    #[test]
    fn filename_replaces_whitespace_runs() {
        assert_eq!(
            download_filename(&invoice(1, "x")),
            "Facture_INV-00001234_Camille_Rousseau.pdf"
        );
    }

    #[test]
    fn filename_neutralises_path_separators() {
        let mut inv = invoice(1, "x");
        inv.customer_name = "A/B \"C\"".into();
        assert_eq!(download_filename(&inv), "Facture_INV-00001234_A_B__C_.pdf");
    }

    #[test]
    fn page_break_trigger() {
        assert!(!needs_page_break(200.0, 13.0));
        assert!(needs_page_break(260.0, 13.0));
        assert!(!needs_page_break(PAGE_HEIGHT - BOTTOM_MARGIN - 13.0, 13.0));
    }

    #[test]
    fn single_page_has_header_columns_and_totals_in_order() {
        let pages = layout_invoice(&invoice(2, "Bouquet"));
        assert_eq!(pages.len(), 1);
        let t = texts(&pages[0]);

        let pos = |needle: &str| {
            t.iter()
                .position(|s| *s == needle)
                .unwrap_or_else(|| panic!("{needle} not drawn"))
        };
        assert!(pos("Description") < pos("Qté"));
        assert!(pos("Qté") < pos("P.U. (€)"));
        assert!(pos("P.U. (€)") < pos("Total (€)"));
        assert!(pos("Sous-total HT:") < pos("TVA (20%):"));
        assert!(pos("TVA (20%):") < pos("TOTAL TTC:"));
        assert!(t.contains(&"FACTURE"));
        assert!(t.contains(&"5.00€"));
        assert!(t.contains(&"6.00€"));
        assert!(!t.iter().any(|s| s.starts_with("Téléphone")));
    }

    #[test]
    fn grand_total_is_bold_and_emphasised() {
        let pages = layout_invoice(&invoice(1, "Vase"));
        let total = pages[0]
            .iter()
            .find(|op| op.text() == Some("TOTAL TTC:"))
            .unwrap();
        match total {
            DrawOp::Text { bold, size, .. } => {
                assert!(*bold);
                assert!(*size > 10.0);
            }
            _ => unreachable!(),
        }
        assert!(pages[0]
            .iter()
            .any(|op| matches!(op, DrawOp::FillRect { color, .. } if *color == SHADE)));
    }

    #[test]
    fn phone_is_shown_when_present() {
        let mut inv = invoice(1, "Vase");
        inv.customer_phone = "06 00 00 00 00".into();
        let pages = layout_invoice(&inv);
        assert!(texts(&pages[0]).contains(&"Téléphone: 06 00 00 00 00"));
    }

    #[test]
    fn many_items_paginate_and_every_row_stays_above_margin() {
        let pages = layout_invoice(&invoice(60, "Article"));
        assert!(pages.len() > 1, "60 rows must not fit one page");

        let limit = PAGE_HEIGHT - BOTTOM_MARGIN;
        for page in &pages {
            for op in page {
                if let DrawOp::Line { y1, .. } = op {
                    assert!(*y1 <= limit, "row rule at {y1} crosses {limit}");
                }
            }
            assert!(texts(page).contains(&"Merci pour votre confiance !"));
        }
        // every item drawn exactly once
        let drawn: usize = pages
            .iter()
            .flat_map(|p| texts(p))
            .filter(|t| t.starts_with("Article "))
            .count();
        assert_eq!(drawn, 60);
        // continuation pages repeat the table header
        assert!(texts(&pages[1]).contains(&"Description"));
    }

    #[test]
    fn long_description_wraps() {
        let lines = wrap_text(
            "Robe longue en soie sauvage brodée main avec ceinture assortie et doublure",
            DESCRIPTION_WIDTH,
            10.0,
            false,
        );
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(line, 10.0, false) <= DESCRIPTION_WIDTH);
        }
    }

    #[test]
    fn wrap_splits_unbreakable_words() {
        let word = "x".repeat(200);
        let lines = wrap_text(&word, 30.0, 10.0, false);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), word);
    }

    #[test]
    fn wrap_empty_is_one_line() {
        assert_eq!(wrap_text("", 50.0, 10.0, false), vec![String::new()]);
    }

    #[test]
    fn win_ansi_encoding() {
        assert_eq!(encode_win_ansi("é€"), vec![0xE9, 0x80]);
        assert_eq!(encode_win_ansi("a😀"), vec![b'a', b'?']);
    }

    #[test]
    fn pdf_bytes_parse_back_with_expected_page_count() {
        let bytes = render_invoice_pdf(&invoice(60, "Coussin")).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(
            doc.get_pages().len(),
            layout_invoice(&invoice(60, "Coussin")).len()
        );
    }
}
