use std::io::{Cursor, Write};

use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, Stream,
};
use rust_decimal::Decimal;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::services::{
    report_store::ReportFileType,
    schedule_e::ScheduleELine,
    tax_aggregation::{round_money, PropertyYearAggregate},
    tax_reports::TaxReportError,
};

// US Letter, in points.
const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const MARGIN_LEFT: i64 = 56;
const AMOUNT_COLUMN: i64 = 440;
const LINE_HEIGHT: i64 = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub file_type: ReportFileType,
}

pub fn render_single(aggregate: &PropertyYearAggregate) -> Result<RenderedArtifact, TaxReportError> {
    let bytes = render_pdf(aggregate)?;
    Ok(RenderedArtifact {
        bytes,
        file_name: single_file_name(aggregate),
        file_type: ReportFileType::Pdf,
    })
}

/// Packs one PDF per aggregate, in input order, into a single archive.
pub fn render_batch(aggregates: &[PropertyYearAggregate]) -> Result<RenderedArtifact, TaxReportError> {
    let Some(first) = aggregates.first() else {
        return Err(TaxReportError::EmptyPropertyList);
    };

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut used_names: Vec<String> = Vec::with_capacity(aggregates.len());

    for aggregate in aggregates {
        let pdf = render_pdf(aggregate)?;
        let entry_name = unique_entry_name(&single_file_name(aggregate), &used_names);
        writer
            .start_file(entry_name.as_str(), options)
            .map_err(|error| TaxReportError::Render(format!("Could not add zip entry: {error}")))?;
        writer
            .write_all(&pdf)
            .map_err(|error| TaxReportError::Render(format!("Could not write zip entry: {error}")))?;
        used_names.push(entry_name);
    }

    let cursor = writer
        .finish()
        .map_err(|error| TaxReportError::Render(format!("Could not finish zip archive: {error}")))?;

    Ok(RenderedArtifact {
        bytes: cursor.into_inner(),
        file_name: format!("Schedule-E-Reports-{}.zip", first.year),
        file_type: ReportFileType::Zip,
    })
}

pub fn single_file_name(aggregate: &PropertyYearAggregate) -> String {
    format!(
        "Schedule-E-{}-{}.pdf",
        sanitize_file_component(&aggregate.property_name),
        aggregate.year
    )
}

fn unique_entry_name(candidate: &str, used: &[String]) -> String {
    if !used.iter().any(|name| name == candidate) {
        return candidate.to_string();
    }
    let stem = candidate.strip_suffix(".pdf").unwrap_or(candidate);
    let mut suffix = 2;
    loop {
        let next = format!("{stem}-{suffix}.pdf");
        if !used.iter().any(|name| *name == next) {
            return next;
        }
        suffix += 1;
    }
}

fn sanitize_file_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "Property".to_string()
    } else {
        trimmed.to_string()
    }
}

fn render_pdf(aggregate: &PropertyYearAggregate) -> Result<Vec<u8>, TaxReportError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_font,
            "F2" => bold_font,
        },
    });

    let content = Content {
        operations: page_operations(aggregate),
    };
    let encoded = content
        .encode()
        .map_err(|error| TaxReportError::Render(format!("Could not encode PDF content: {error}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|error| TaxReportError::Render(format!("Could not write PDF: {error}")))?;
    Ok(bytes)
}

fn page_operations(aggregate: &PropertyYearAggregate) -> Vec<Operation> {
    let mut ops = Vec::new();
    let mut y = PAGE_HEIGHT - 64;

    text(&mut ops, "F2", 14, MARGIN_LEFT, y, "Schedule E (Form 1040) - Supplemental Income and Loss");
    y -= LINE_HEIGHT + 6;
    text(&mut ops, "F1", 11, MARGIN_LEFT, y, &format!("Property: {}", aggregate.property_name));
    y -= LINE_HEIGHT;
    text(&mut ops, "F1", 11, MARGIN_LEFT, y, &format!("Tax year: {}", aggregate.year));
    y -= LINE_HEIGHT * 2;

    text(&mut ops, "F2", 11, MARGIN_LEFT, y, "Part I - Income or Loss From Rental Real Estate");
    y -= LINE_HEIGHT + 4;
    amount_row(&mut ops, y, "Line 3", "Rents received", aggregate.total_income, false);
    y -= LINE_HEIGHT + 4;

    text(&mut ops, "F2", 11, MARGIN_LEFT, y, "Expenses");
    y -= LINE_HEIGHT;
    for line in ScheduleELine::ALL {
        let label = format!("Line {}", line.line_number());
        amount_row(&mut ops, y, &label, line.label(), aggregate.line_amount(line), false);
        y -= LINE_HEIGHT;
    }
    y -= 4;
    amount_row(&mut ops, y, "Line 20", "Total expenses", aggregate.total_expenses, true);
    y -= LINE_HEIGHT;
    amount_row(&mut ops, y, "Line 21", "Net income (loss)", aggregate.net_income, true);
    y -= LINE_HEIGHT * 2;

    text(
        &mut ops,
        "F1",
        8,
        MARGIN_LEFT,
        y,
        "Amounts in USD, totalled from recorded income and expenses for the tax year.",
    );
    ops
}

fn amount_row(ops: &mut Vec<Operation>, y: i64, line: &str, label: &str, amount: Decimal, bold: bool) {
    let font = if bold { "F2" } else { "F1" };
    text(ops, font, 10, MARGIN_LEFT, y, line);
    text(ops, font, 10, MARGIN_LEFT + 56, y, label);
    text(ops, font, 10, AMOUNT_COLUMN, y, &format_money(amount));
}

fn text(ops: &mut Vec<Operation>, font: &str, size: i64, x: i64, y: i64, value: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(pdf_text(value))]));
    ops.push(Operation::new("ET", vec![]));
}

/// Encodes text for the WinAnsi-encoded standard fonts. Printable ASCII and
/// Latin-1 map to the same byte; anything else becomes `?`.
fn pdf_text(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|ch| match u32::from(ch) {
            code @ 0x20..=0x7e | code @ 0xa0..=0xff => code as u8,
            _ => b'?',
        })
        .collect()
}

fn format_money(amount: Decimal) -> String {
    let rounded = round_money(amount);
    let digits = rounded.abs().to_string();
    let (whole, cents) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, ch) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}${grouped}.{cents}")
}
