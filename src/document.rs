//! Book document assembly.
//!
//! Turns generated book text into a downloadable file in the format the
//! survey asked for. EPUB and DOCX packages are built by hand and zipped;
//! PDF is rendered with printpdf's builtin fonts; MOBI goes through a
//! temporary EPUB handed to Calibre's `ebook-convert`.

use std::io::{Cursor, Write};

use chrono::Utc;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::AssemblyError;
use crate::session::BookFormat;

/// A finished document ready to send as an attachment.
#[derive(Debug, Clone)]
pub struct Document {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Assemble `text` into a document of the requested format.
///
/// `converter` is the external EPUB-to-MOBI executable, only consulted for
/// MOBI output.
///
/// # Errors
///
/// Returns [`AssemblyError`] when the package cannot be built, or for MOBI
/// when the external converter is missing or exits non-zero.
pub async fn assemble(
    format: BookFormat,
    title: &str,
    text: &str,
    converter: &str,
) -> Result<Document, AssemblyError> {
    let bytes = match format {
        BookFormat::Epub => build_epub(title, text)?,
        BookFormat::Docx => build_docx(title, text)?,
        BookFormat::Pdf => build_pdf(title, text)?,
        BookFormat::Mobi => build_mobi(title, text, converter).await?,
    };

    Ok(Document {
        file_name: file_name(title, format),
        bytes,
    })
}

/// Derive an attachment filename from the title: keep letters, digits, and
/// whitespace, collapse whitespace runs to `_`, append the extension.
#[must_use]
pub fn file_name(title: &str, format: BookFormat) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let base = kept.split_whitespace().collect::<Vec<_>>().join("_");
    let base = if base.is_empty() { "book" } else { &base };
    format!("{base}.{}", format.extension())
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Build a minimal EPUB 3 package: stored `mimetype` first, container
/// descriptor, package document, nav document, and one chapter with
/// newlines rendered as line breaks.
fn build_epub(title: &str, text: &str) -> Result<Vec<u8>, AssemblyError> {
    let archive_err = |source| AssemblyError::Archive {
        format: "epub",
        source,
    };

    let title = xml_escape(title);
    let body = xml_escape(text).replace('\n', "<br/>\n");
    let identifier = uuid::Uuid::new_v4();
    let modified = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");

    let container = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n\
         <rootfiles>\n\
         <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n\
         </rootfiles>\n\
         </container>\n";

    let package = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"book-id\">\n\
         <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n\
         <dc:identifier id=\"book-id\">urn:uuid:{identifier}</dc:identifier>\n\
         <dc:title>{title}</dc:title>\n\
         <dc:language>en</dc:language>\n\
         <meta property=\"dcterms:modified\">{modified}</meta>\n\
         </metadata>\n\
         <manifest>\n\
         <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n\
         <item id=\"chapter1\" href=\"chapter1.xhtml\" media-type=\"application/xhtml+xml\"/>\n\
         </manifest>\n\
         <spine>\n\
         <itemref idref=\"chapter1\"/>\n\
         </spine>\n\
         </package>\n"
    );

    let nav = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE html>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">\n\
         <head><title>{title}</title></head>\n\
         <body>\n\
         <nav epub:type=\"toc\">\n\
         <ol><li><a href=\"chapter1.xhtml\">{title}</a></li></ol>\n\
         </nav>\n\
         </body>\n\
         </html>\n"
    );

    let chapter = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE html>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\">\n\
         <head><title>{title}</title></head>\n\
         <body>\n\
         <h1>{title}</h1>\n\
         <p>{body}</p>\n\
         </body>\n\
         </html>\n"
    );

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // The mimetype entry must come first and stay uncompressed.
    zip.start_file("mimetype", stored).map_err(archive_err)?;
    zip.write_all(b"application/epub+zip")?;

    for (name, contents) in [
        ("META-INF/container.xml", container),
        ("OEBPS/content.opf", package.as_str()),
        ("OEBPS/nav.xhtml", nav.as_str()),
        ("OEBPS/chapter1.xhtml", chapter.as_str()),
    ] {
        zip.start_file(name, deflated).map_err(archive_err)?;
        zip.write_all(contents.as_bytes())?;
    }

    let cursor = zip.finish().map_err(archive_err)?;
    Ok(cursor.into_inner())
}

/// Build a minimal OOXML package: one section, a centered heading, and the
/// body text as a single run with newlines rendered as breaks.
fn build_docx(title: &str, text: &str) -> Result<Vec<u8>, AssemblyError> {
    let archive_err = |source| AssemblyError::Archive {
        format: "docx",
        source,
    };

    let content_types = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\n\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\n\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\n\
         <Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\n\
         </Types>\n";

    let rels = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\n\
         <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"word/document.xml\"/>\n\
         </Relationships>\n";

    let body_run = text
        .split('\n')
        .map(|line| format!("<w:t xml:space=\"preserve\">{}</w:t>", xml_escape(line)))
        .collect::<Vec<_>>()
        .join("<w:br/>");

    let document = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\n\
         <w:body>\n\
         <w:p><w:pPr><w:jc w:val=\"center\"/></w:pPr>\
         <w:r><w:rPr><w:b/><w:sz w:val=\"48\"/></w:rPr>\
         <w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>\n\
         <w:p><w:r>{body_run}</w:r></w:p>\n\
         <w:sectPr/>\n\
         </w:body>\n\
         </w:document>\n",
        xml_escape(title)
    );

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, contents) in [
        ("[Content_Types].xml", content_types),
        ("_rels/.rels", rels),
        ("word/document.xml", document.as_str()),
    ] {
        zip.start_file(name, deflated).map_err(archive_err)?;
        zip.write_all(contents.as_bytes())?;
    }

    let cursor = zip.finish().map_err(archive_err)?;
    Ok(cursor.into_inner())
}

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const BODY_CHARS_PER_LINE: usize = 80;
const FIRST_PAGE_LINES: usize = 44;
const PAGE_LINES: usize = 50;

/// Render the title (large, centered) followed by the word-wrapped body
/// across as many A4 pages as it takes.
fn build_pdf(title: &str, text: &str) -> Result<Vec<u8>, AssemblyError> {
    let pdf_err = |e: &dyn std::fmt::Display| AssemblyError::Pdf(e.to_string());

    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
    let title_font = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| pdf_err(&e))?;
    let body_font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| pdf_err(&e))?;

    let layer = doc.get_page(first_page).get_layer(first_layer);
    let title_x = ((PAGE_WIDTH_MM - estimated_width_mm(title, 24.0)) / 2.0).max(MARGIN_MM);
    layer.use_text(title, 24.0, Mm(title_x), Mm(PAGE_HEIGHT_MM - 40.0), &title_font);

    let lines = wrap_text(text, BODY_CHARS_PER_LINE);
    let mut remaining = lines.as_slice();
    let mut page_capacity = FIRST_PAGE_LINES;
    let mut start_y = PAGE_HEIGHT_MM - 55.0;
    let mut layer = layer;

    loop {
        let (page_lines, rest) = remaining.split_at(page_capacity.min(remaining.len()));

        layer.begin_text_section();
        layer.set_font(&body_font, 12.0);
        layer.set_line_height(14.0);
        layer.set_text_cursor(Mm(MARGIN_MM), Mm(start_y));
        for line in page_lines {
            layer.write_text(line.as_str(), &body_font);
            layer.add_line_break();
        }
        layer.end_text_section();

        if rest.is_empty() {
            break;
        }
        remaining = rest;
        page_capacity = PAGE_LINES;
        start_y = PAGE_HEIGHT_MM - MARGIN_MM;
        let (page, layer_index) =
            doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
        layer = doc.get_page(page).get_layer(layer_index);
    }

    doc.save_to_bytes().map_err(|e| pdf_err(&e))
}

/// Rough Helvetica width estimate for centering, in millimeters.
#[allow(clippy::cast_precision_loss)]
fn estimated_width_mm(text: &str, font_size_pt: f32) -> f32 {
    // Average glyph width ~0.5 em; 1 pt = 0.3528 mm.
    text.chars().count() as f32 * font_size_pt * 0.5 * 0.3528
}

/// Greedy word wrap. Paragraph breaks are preserved; a single word longer
/// than the limit gets its own line.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        if paragraph.trim().is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current = word.to_string();
            } else if current.len() + 1 + word.len() <= max_chars {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(current);
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

/// Assemble an EPUB, convert it with the external tool, and read the MOBI
/// back. Both temporary files live in a scoped directory that is removed
/// on every exit path.
async fn build_mobi(title: &str, text: &str, converter: &str) -> Result<Vec<u8>, AssemblyError> {
    let epub = build_epub(title, text)?;

    let dir = tempfile::Builder::new().prefix("bindery-mobi").tempdir()?;
    let epub_path = dir.path().join("book.epub");
    let mobi_path = dir.path().join("book.mobi");

    tokio::fs::write(&epub_path, &epub).await?;

    tracing::debug!("Converting EPUB to MOBI with {converter}");
    let output = match tokio::process::Command::new(converter)
        .arg(&epub_path)
        .arg(&mobi_path)
        .output()
        .await
    {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AssemblyError::ConverterMissing {
                tool: converter.to_string(),
            });
        }
        other => other?,
    };

    if !output.status.success() {
        return Err(AssemblyError::ConverterFailed {
            tool: converter.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let bytes = tokio::fs::read(&mobi_path).await?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut contents = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        contents
    }

    #[test]
    fn file_name_sanitizes_the_title() {
        assert_eq!(
            file_name("My Book: Part 2!", BookFormat::Epub),
            "My_Book_Part_2.epub"
        );
        assert_eq!(file_name("Plain", BookFormat::Docx), "Plain.docx");
        assert_eq!(file_name("?!*", BookFormat::Pdf), "book.pdf");
        assert_eq!(file_name("  spaced   out  ", BookFormat::Mobi), "spaced_out.mobi");
    }

    #[test]
    fn epub_round_trips_title_and_body() {
        let bytes = build_epub("T & Co", "body line one\nbody line two").unwrap();

        let chapter = read_entry(&bytes, "OEBPS/chapter1.xhtml");
        assert!(chapter.contains("body line one<br/>"));
        assert!(chapter.contains("body line two"));
        assert!(chapter.contains("<h1>T &amp; Co</h1>"));

        let package = read_entry(&bytes, "OEBPS/content.opf");
        assert!(package.contains("<dc:title>T &amp; Co</dc:title>"));
        assert!(package.contains("urn:uuid:"));
    }

    #[test]
    fn epub_mimetype_is_the_first_entry() {
        let bytes = build_epub("T", "body").unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let mut first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        let mut mimetype = String::new();
        first.read_to_string(&mut mimetype).unwrap();
        assert_eq!(mimetype, "application/epub+zip");
    }

    #[test]
    fn docx_contains_centered_heading_and_body() {
        let bytes = build_docx("Title <here>", "first\nsecond").unwrap();

        let document = read_entry(&bytes, "word/document.xml");
        assert!(document.contains("<w:jc w:val=\"center\"/>"));
        assert!(document.contains("Title &lt;here&gt;"));
        assert!(document.contains("first</w:t><w:br/><w:t xml:space=\"preserve\">second"));

        // Required package plumbing.
        assert!(read_entry(&bytes, "[Content_Types].xml").contains("/word/document.xml"));
        assert!(read_entry(&bytes, "_rels/.rels").contains("word/document.xml"));
    }

    #[test]
    fn pdf_has_a_pdf_header() {
        let bytes = build_pdf("T", &"lorem ipsum ".repeat(500)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn wrap_text_respects_the_limit() {
        let lines = wrap_text("alpha beta gamma delta", 11);
        assert_eq!(lines, vec!["alpha beta", "gamma delta"]);

        let lines = wrap_text("one\n\ntwo", 80);
        assert_eq!(lines, vec!["one", "", "two"]);

        let lines = wrap_text("supercalifragilistic", 5);
        assert_eq!(lines, vec!["supercalifragilistic"]);
    }

    #[tokio::test]
    async fn missing_converter_reports_the_tool_and_cleans_up() {
        let err = assemble(BookFormat::Mobi, "T", "body", "bindery-test-no-such-tool")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("bindery-test-no-such-tool"));

        // The scoped temp directory must be gone on the failure path too.
        let leftovers: Vec<_> = std::fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("bindery-mobi")
            })
            .collect();
        assert!(leftovers.is_empty(), "leftover temp dirs: {leftovers:?}");
    }
}
