//! Text readers for Office Open XML containers (DOCX, PPTX).

use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

use super::ExtractError;

const DOCX_BODY: &str = "word/document.xml";
const SLIDE_PREFIX: &str = "ppt/slides/slide";

/// Non-empty paragraphs of the document body, one per line.
pub(super) fn docx_text(path: &Path) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let xml = read_part(&mut archive, DOCX_BODY)?;
    let paragraphs = paragraphs(&xml, b"w:p", b"w:t", b"w:tab", b"w:br")?;
    Ok(paragraphs
        .into_iter()
        .filter(|paragraph| !paragraph.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Shape text of every slide in presentation order, each slide preceded by a marker line.
pub(super) fn pptx_text(path: &Path) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix(SLIDE_PREFIX)?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut parts = Vec::new();
    for (position, (_, name)) in slides.iter().enumerate() {
        parts.push(format!("\n--- Slide {} ---\n", position + 1));
        let xml = read_part(&mut archive, name)?;
        for shape in shape_texts(&xml)? {
            let shape = shape.trim();
            if !shape.is_empty() {
                parts.push(shape.to_string());
            }
        }
    }
    Ok(parts.join("\n").trim().to_string())
}

fn read_part(archive: &mut ZipArchive<File>, name: &str) -> Result<String, ExtractError> {
    let mut part = archive.by_name(name)?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Collect the text runs of every `paragraph` element.
fn paragraphs(
    xml: &str,
    paragraph: &[u8],
    run_text: &[u8],
    tab: &[u8],
    line_break: &[u8],
) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                let name = element.name();
                if name.as_ref() == paragraph {
                    current = Some(String::new());
                } else if name.as_ref() == run_text {
                    in_text = true;
                }
            }
            Event::Empty(element) => {
                if let Some(text) = current.as_mut() {
                    if element.name().as_ref() == tab {
                        text.push('\t');
                    } else if element.name().as_ref() == line_break {
                        text.push('\n');
                    }
                }
            }
            Event::Text(content) if in_text => {
                if let Some(text) = current.as_mut() {
                    text.push_str(&content.unescape()?);
                }
            }
            Event::End(element) => {
                let name = element.name();
                if name.as_ref() == run_text {
                    in_text = false;
                } else if name.as_ref() == paragraph
                    && let Some(text) = current.take()
                {
                    out.push(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Text of each `p:sp` shape on a slide, paragraphs joined by newlines.
fn shape_texts(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut shapes = Vec::new();
    let mut shape: Option<Vec<String>> = None;
    let mut paragraph: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) => match element.name().as_ref() {
                b"p:sp" => shape = Some(Vec::new()),
                b"a:p" if shape.is_some() => paragraph = Some(String::new()),
                b"a:t" => in_text = true,
                _ => {}
            },
            Event::Empty(element) => {
                if element.name().as_ref() == b"a:br"
                    && let Some(text) = paragraph.as_mut()
                {
                    text.push('\n');
                }
            }
            Event::Text(content) if in_text => {
                if let Some(text) = paragraph.as_mut() {
                    text.push_str(&content.unescape()?);
                }
            }
            Event::End(element) => match element.name().as_ref() {
                b"a:t" => in_text = false,
                b"a:p" => {
                    if let (Some(lines), Some(text)) = (shape.as_mut(), paragraph.take()) {
                        lines.push(text);
                    }
                }
                b"p:sp" => {
                    if let Some(lines) = shape.take() {
                        shapes.push(lines.join("\n"));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(shapes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn write_package(parts: &[(&str, &str)]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = ZipWriter::new(file.reopen().unwrap());
        for (name, body) in parts {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        file
    }

    #[test]
    fn docx_paragraphs_skip_blank_lines() {
        let body = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>Cell</w:t></w:r><w:r><w:t xml:space="preserve"> biology</w:t></w:r></w:p>
<w:p><w:r><w:t>   </w:t></w:r></w:p>
<w:p><w:r><w:t>Mitosis</w:t><w:tab/><w:t>&amp; meiosis</w:t></w:r></w:p>
</w:body></w:document>"#;
        let file = write_package(&[(DOCX_BODY, body)]);
        let text = docx_text(file.path()).unwrap();
        assert_eq!(text, "Cell biology\nMitosis\t& meiosis");
    }

    #[test]
    fn pptx_slides_are_ordered_numerically() {
        let slide = |text: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree>
<p:sp><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p><a:p><a:r><a:t>detail</a:t></a:r></a:p></p:txBody></p:sp>
<p:sp><p:txBody><a:p><a:r><a:t> </a:t></a:r></a:p></p:txBody></p:sp>
</p:spTree></p:cSld></p:sld>"#
            )
        };
        let first = slide("Intro");
        let tenth = slide("Wrap-up");
        let second = slide("Body");
        let file = write_package(&[
            ("ppt/slides/slide10.xml", &tenth),
            ("ppt/slides/slide1.xml", &first),
            ("ppt/slides/slide2.xml", &second),
            ("ppt/slides/_rels/slide1.xml.rels", "<Relationships/>"),
        ]);

        let text = pptx_text(file.path()).unwrap();
        let intro = text.find("Intro").unwrap();
        let body = text.find("Body").unwrap();
        let wrap = text.find("Wrap-up").unwrap();
        assert!(intro < body && body < wrap);
        assert!(text.starts_with("--- Slide 1 ---"));
        assert!(text.contains("--- Slide 3 ---"));
        assert!(text.contains("Intro\ndetail"));
    }

    #[test]
    fn docx_without_body_is_an_archive_error() {
        let file = write_package(&[("word/styles.xml", "<w:styles/>")]);
        assert!(matches!(
            docx_text(file.path()),
            Err(ExtractError::Archive(_))
        ));
    }
}
