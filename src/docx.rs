use std::io::{Cursor, Read, Seek, Write};

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Reader};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::spacing::{plan_spacers, ParagraphInfo, SpacingRules};

// ── Constants ────────────────────────────────────────────────────────────────

const PACKAGE_RELS: &str = "_rels/.rels";
const DEFAULT_DOCUMENT_PART: &str = "word/document.xml";
const OFFICE_DOCUMENT_REL: &str = "/officeDocument";

const WORDPROCESSING_NS: &[&[u8]] = &[
    b"http://schemas.openxmlformats.org/wordprocessingml/2006/main",
    b"http://purl.oclc.org/ooxml/wordprocessingml/main",
];
const PICTURE_NS: &[&[u8]] = &[
    b"http://schemas.openxmlformats.org/drawingml/2006/picture",
    b"http://purl.oclc.org/ooxml/drawingml/picture",
];
const MARKUP_COMPATIBILITY_NS: &[u8] =
    b"http://schemas.openxmlformats.org/markup-compatibility/2006";

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum DocxError {
    #[error("file is not a valid .docx package: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("package has no {0} part")]
    MissingPart(String),
    #[error("{0} is not valid UTF-8")]
    Encoding(String),
    #[error("malformed document XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("document XML ends with {0} unclosed element(s)")]
    Truncated(usize),
    #[error("failed to write package: {0}")]
    Io(#[from] std::io::Error),
}

// ── Public result types ──────────────────────────────────────────────────────

/// A direct child paragraph of `w:body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyParagraph {
    pub info: ParagraphInfo,
    /// Qualified element name as written, e.g. `w:p`.
    pub name: String,
    /// Byte offset just past the paragraph's closing tag.
    pub end: usize,
}

#[derive(Debug)]
pub struct SpacedXml {
    pub xml: String,
    pub paragraphs: usize,
    pub spacers_inserted: usize,
}

#[derive(Debug)]
pub struct ProcessedDocx {
    pub bytes: Vec<u8>,
    pub spacers_inserted: usize,
    pub paragraphs: usize,
}

// ── Package processing ───────────────────────────────────────────────────────

/// Rewrite the main document part of a `.docx` package, copying every other
/// entry through in its original order.
pub fn process_docx(bytes: &[u8], rules: &SpacingRules) -> Result<ProcessedDocx, DocxError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let part = main_document_part(&mut archive)?;
    let xml = read_entry_text(&mut archive, &part)?;

    let spaced = insert_spacers(&xml, rules)?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let method = match entry.compression() {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let options = SimpleFileOptions::default().compression_method(method);

        if entry.is_dir() {
            writer.add_directory(name, options)?;
            continue;
        }

        writer.start_file(name.clone(), options)?;
        if name == part {
            writer.write_all(spaced.xml.as_bytes())?;
        } else {
            std::io::copy(&mut entry, &mut writer)?;
        }
    }

    let bytes = writer.finish()?.into_inner();

    tracing::debug!(
        part = %part,
        paragraphs = spaced.paragraphs,
        spacers = spaced.spacers_inserted,
        "document part rewritten"
    );

    Ok(ProcessedDocx {
        bytes,
        spacers_inserted: spaced.spacers_inserted,
        paragraphs: spaced.paragraphs,
    })
}

/// Locate the main document part through the package relationships, falling
/// back to the conventional `word/document.xml`.
fn main_document_part<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, DocxError> {
    let rels = match read_entry_text(archive, PACKAGE_RELS) {
        Ok(rels) => rels,
        Err(DocxError::MissingPart(_)) => return Ok(DEFAULT_DOCUMENT_PART.to_string()),
        Err(e) => return Err(e),
    };

    let mut reader = Reader::from_str(&rels);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut is_office_document = false;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    let value = attr.unescape_value()?;
                    match attr.key.as_ref() {
                        b"Type" => is_office_document = value.ends_with(OFFICE_DOCUMENT_REL),
                        b"Target" => target = Some(value.trim_start_matches('/').to_string()),
                        _ => {}
                    }
                }
                if let (true, Some(target)) = (is_office_document, target) {
                    return Ok(target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(DEFAULT_DOCUMENT_PART.to_string())
}

fn read_entry_text<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, DocxError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(DocxError::MissingPart(name.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    String::from_utf8(buf).map_err(|_| DocxError::Encoding(name.to_string()))
}

// ── Document XML ─────────────────────────────────────────────────────────────

/// Splice a spacer paragraph after every planned paragraph. Bytes outside the
/// insertion points are left untouched.
pub fn insert_spacers(xml: &str, rules: &SpacingRules) -> Result<SpacedXml, DocxError> {
    let paragraphs = scan_paragraphs(xml)?;
    let infos: Vec<ParagraphInfo> = paragraphs.iter().map(|p| p.info.clone()).collect();
    let plan = plan_spacers(&infos, rules);

    let mut out = String::with_capacity(xml.len() + plan.len() * 8);
    let mut cursor = 0;
    for &index in plan.indices() {
        let paragraph = &paragraphs[index];
        out.push_str(&xml[cursor..paragraph.end]);
        // Same qualified name as the neighbour, so the spacer binds to
        // whatever prefix the document uses for WordprocessingML.
        out.push('<');
        out.push_str(&paragraph.name);
        out.push_str("/>");
        cursor = paragraph.end;
    }
    out.push_str(&xml[cursor..]);

    Ok(SpacedXml {
        xml: out,
        paragraphs: paragraphs.len(),
        spacers_inserted: plan.len(),
    })
}

/// WordprocessingML elements the scanner cares about, resolved by namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Body,
    Paragraph,
    Run,
    Text,
    Tab,
    Break,
    CarriageReturn,
    TextBox,
    Picture,
    Fallback,
    Other,
}

impl Tag {
    fn resolve(ns: &ResolveResult, local: &[u8]) -> Self {
        let uri = match ns {
            ResolveResult::Bound(Namespace(uri)) => *uri,
            _ => return Tag::Other,
        };
        if WORDPROCESSING_NS.iter().any(|ns| *ns == uri) {
            match local {
                b"body" => Tag::Body,
                b"p" => Tag::Paragraph,
                b"r" => Tag::Run,
                b"t" => Tag::Text,
                b"tab" => Tag::Tab,
                b"br" => Tag::Break,
                b"cr" => Tag::CarriageReturn,
                b"txbxContent" => Tag::TextBox,
                _ => Tag::Other,
            }
        } else if PICTURE_NS.iter().any(|ns| *ns == uri) && local == b"pic" {
            Tag::Picture
        } else if uri == MARKUP_COMPATIBILITY_NS && local == b"Fallback" {
            Tag::Fallback
        } else {
            Tag::Other
        }
    }

    /// Text boxes and compatibility fallbacks repeat or hide content that is
    /// not part of the paragraph's own runs.
    fn hides_text(self) -> bool {
        matches!(self, Tag::TextBox | Tag::Fallback)
    }
}

/// Collect the paragraphs that sit directly under `w:body`. Paragraphs in
/// tables, text boxes and content controls are not part of the sequence.
pub fn scan_paragraphs(xml: &str) -> Result<Vec<BodyParagraph>, DocxError> {
    let mut reader = NsReader::from_str(xml);

    let mut stack: Vec<Tag> = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current: Option<(ParagraphInfo, String)> = None;
    let mut paragraph_depth = 0;
    let mut skip_depth: Option<usize> = None;

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let tag = match &event {
            Event::Start(e) | Event::Empty(e) => Tag::resolve(&ns, e.local_name().as_ref()),
            _ => Tag::Other,
        };

        match event {
            Event::Start(e) => {
                if current.is_none() && tag == Tag::Paragraph && is_body(&stack) {
                    current = Some((ParagraphInfo::default(), qualified_name(&e)));
                    paragraph_depth = stack.len();
                } else if let Some((paragraph, _)) = current.as_mut() {
                    observe(paragraph, tag, &e, stack.last(), skip_depth.is_some());
                    if skip_depth.is_none() && tag.hides_text() {
                        skip_depth = Some(stack.len());
                    }
                }
                stack.push(tag);
            }
            Event::Empty(e) => {
                if current.is_none() && tag == Tag::Paragraph && is_body(&stack) {
                    paragraphs.push(BodyParagraph {
                        info: ParagraphInfo::default(),
                        name: qualified_name(&e),
                        end: reader.buffer_position(),
                    });
                } else if let Some((paragraph, _)) = current.as_mut() {
                    observe(paragraph, tag, &e, stack.last(), skip_depth.is_some());
                }
            }
            Event::End(_) => {
                stack.pop();
                if skip_depth == Some(stack.len()) {
                    skip_depth = None;
                }
                if current.is_some() && stack.len() == paragraph_depth {
                    if let Some((info, name)) = current.take() {
                        paragraphs.push(BodyParagraph {
                            info,
                            name,
                            end: reader.buffer_position(),
                        });
                    }
                }
            }
            Event::Text(t) => {
                if let Some((paragraph, _)) = current.as_mut() {
                    if skip_depth.is_none() && stack.last() == Some(&Tag::Text) {
                        paragraph.text.push_str(&t.unescape()?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(DocxError::Truncated(stack.len()));
    }

    Ok(paragraphs)
}

fn is_body(stack: &[Tag]) -> bool {
    stack.last() == Some(&Tag::Body)
}

fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Record what an element inside a body paragraph contributes.
fn observe(
    paragraph: &mut ParagraphInfo,
    tag: Tag,
    e: &BytesStart<'_>,
    parent: Option<&Tag>,
    hidden: bool,
) {
    if tag == Tag::Picture {
        paragraph.has_picture = true;
    }
    // Tab stops live under w:pPr/w:tabs; only run children carry text.
    if hidden || parent != Some(&Tag::Run) {
        return;
    }
    match tag {
        Tag::Tab => paragraph.text.push('\t'),
        Tag::CarriageReturn => paragraph.text.push('\n'),
        Tag::Break if is_line_break(e) => paragraph.text.push('\n'),
        _ => {}
    }
}

/// Page and column breaks carry no text; only text-wrapping breaks do.
fn is_line_break(e: &BytesStart<'_>) -> bool {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"type")
        .map_or(true, |attr| attr.value.as_ref() == b"textWrapping")
}
