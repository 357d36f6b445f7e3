//! Local document extractors: PDF, Word, PowerPoint and plain text.
//!
//! Parsing is CPU-bound and runs on the blocking pool.

use super::{read_source, run_blocking, unescape_xml, TextExtractor};
use crate::models::{Result, SynthkitError};
use async_trait::async_trait;
use regex::Regex;
use std::io::{Cursor, Read};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// PDF text via pdf-extract.
pub struct PdfExtractor;

#[async_trait]
impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    async fn extract(&self, source: &str) -> Result<String> {
        let bytes = read_source(source).await?;
        let source = source.to_string();
        run_blocking(move || pdf_text(&bytes, &source)).await
    }
}

fn pdf_text(bytes: &[u8], source: &str) -> Result<String> {
    // pdf-extract can panic on malformed fonts.
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    })) {
        Ok(Ok(text)) => {
            debug!(source = %source, chars = text.len(), "PDF extracted");
            Ok(text)
        }
        Ok(Err(e)) => Err(SynthkitError::DataFormat(format!(
            "Failed to extract PDF text from {source}: {e}"
        ))),
        Err(_) => {
            warn!(source = %source, "PDF extraction panicked");
            Err(SynthkitError::DataFormat(format!(
                "PDF extraction panicked for {source} (malformed document)"
            )))
        }
    }
}

/// Word documents via docx-rs.
pub struct DocxExtractor;

#[async_trait]
impl TextExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    async fn extract(&self, source: &str) -> Result<String> {
        let bytes = read_source(source).await?;
        let source = source.to_string();
        run_blocking(move || docx_text(&bytes, &source)).await
    }
}

/// Non-empty paragraphs, then non-empty table cells, separated by blank lines.
fn docx_text(bytes: &[u8], source: &str) -> Result<String> {
    let doc = docx_rs::read_docx(bytes)
        .map_err(|e| SynthkitError::DataFormat(format!("Failed to parse DOCX {source}: {e}")))?;

    let mut paragraphs = Vec::new();
    let mut cells = Vec::new();

    for child in &doc.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(para) => {
                let text = paragraph_text(para);
                if !text.trim().is_empty() {
                    paragraphs.push(text);
                }
            }
            docx_rs::DocumentChild::Table(table) => {
                for row in &table.rows {
                    let docx_rs::TableChild::TableRow(tr) = row;
                    for cell in &tr.cells {
                        let docx_rs::TableRowChild::TableCell(tc) = cell;
                        let text = tc
                            .children
                            .iter()
                            .filter_map(|content| match content {
                                docx_rs::TableCellContent::Paragraph(para) => {
                                    Some(paragraph_text(para))
                                }
                                _ => None,
                            })
                            .collect::<Vec<_>>()
                            .join("\n");
                        if !text.trim().is_empty() {
                            cells.push(text);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    paragraphs.extend(cells);
    Ok(paragraphs.join("\n\n"))
}

fn paragraph_text(para: &docx_rs::Paragraph) -> String {
    let mut out = String::new();
    for child in &para.children {
        push_run_text(child, &mut out);
    }
    out
}

fn push_run_text(child: &docx_rs::ParagraphChild, out: &mut String) {
    match child {
        docx_rs::ParagraphChild::Run(run) => {
            for run_child in &run.children {
                if let docx_rs::RunChild::Text(text) = run_child {
                    out.push_str(&text.text);
                }
            }
        }
        docx_rs::ParagraphChild::Hyperlink(link) => {
            for inner in &link.children {
                push_run_text(inner, out);
            }
        }
        _ => {}
    }
}

/// PowerPoint slides, read straight from the OOXML archive.
pub struct PptxExtractor;

#[async_trait]
impl TextExtractor for PptxExtractor {
    fn name(&self) -> &'static str {
        "pptx"
    }

    async fn extract(&self, source: &str) -> Result<String> {
        let bytes = read_source(source).await?;
        let source = source.to_string();
        run_blocking(move || pptx_text(bytes, &source)).await
    }
}

static SLIDE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("static slide pattern"));
static SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<p:sp\b.*?</p:sp>").expect("static shape pattern"));
static TITLE_PH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<p:ph\b[^>]*type="(?:title|ctrTitle)""#).expect("static title pattern")
});
static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<a:p\b[^>]*>.*?</a:p>").expect("static paragraph pattern"));
static RUN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<a:t(?:\s[^>]*)?>(.*?)</a:t>").expect("static run pattern"));

/// `--- Slide N ---`, optional `Title: ...`, then each shape's text.
fn pptx_text(bytes: Vec<u8>, source: &str) -> Result<String> {
    let bad_archive =
        |e: zip::result::ZipError| SynthkitError::DataFormat(format!("Failed to open PPTX {source}: {e}"));

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(bad_archive)?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = SLIDE_NAME_RE.captures(name)?[1].parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut rendered = Vec::with_capacity(slides.len());
    for (index, (_, name)) in slides.iter().enumerate() {
        let mut xml = String::new();
        archive
            .by_name(name)
            .map_err(bad_archive)?
            .read_to_string(&mut xml)
            .map_err(|e| SynthkitError::io(format!("reading {name} in {source}"), e))?;
        rendered.push(render_slide(index + 1, &xml));
    }

    Ok(rendered.join("\n\n"))
}

fn render_slide(number: usize, xml: &str) -> String {
    let mut lines = vec![format!("--- Slide {number} ---")];

    let shapes: Vec<(bool, String)> = SHAPE_RE
        .find_iter(xml)
        .map(|shape| {
            let shape = shape.as_str();
            (TITLE_PH_RE.is_match(shape), shape_text(shape))
        })
        .collect();

    if let Some((_, title)) = shapes.iter().find(|(is_title, _)| *is_title) {
        lines.push(format!("Title: {title}"));
    }
    lines.extend(
        shapes
            .into_iter()
            .map(|(_, text)| text)
            .filter(|text| !text.is_empty()),
    );

    lines.join("\n")
}

fn shape_text(shape: &str) -> String {
    PARAGRAPH_RE
        .find_iter(shape)
        .map(|para| {
            RUN_TEXT_RE
                .captures_iter(para.as_str())
                .map(|run| unescape_xml(&run[1]))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// UTF-8 text files, passed through unchanged.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "txt"
    }

    async fn extract(&self, source: &str) -> Result<String> {
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| SynthkitError::io(format!("reading {source}"), e))
    }
}
