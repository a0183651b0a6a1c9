//! Attribute-only parsing of a single `<row …/>` element (spec §4.4.5: the
//! extractor is XML-agnostic, classification only needs attribute access on
//! one self-closing element per row, so a document tree would be wasted
//! work).

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, thiserror::Error)]
pub enum RowParseError {
    #[error("not a <row> element")]
    NotARow,
    #[error("malformed XML: {0}")]
    Malformed(#[from] quick_xml::Error),
    #[error("malformed attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
}

/// Parses `row_bytes` (one `<row …/>\r\n` record) into its attribute map.
/// Non-`row` tags and malformed XML are reported as [`RowParseError`] so the
/// caller can skip and continue (spec §4.4.5 / §7 `RowParseError`).
pub fn parse_row_attributes(row_bytes: &[u8]) -> Result<HashMap<String, String>, RowParseError> {
    let mut reader = Reader::from_reader(row_bytes);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(tag) | Event::Start(tag) => {
                if tag.name().as_ref() != b"row" {
                    return Err(RowParseError::NotARow);
                }
                let mut attrs = HashMap::new();
                for attr in tag.attributes() {
                    let attr = attr?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr.decode_and_unescape_value(reader.decoder())?.into_owned();
                    attrs.insert(key, value);
                }
                return Ok(attrs);
            }
            Event::Eof => return Err(RowParseError::NotARow),
            _ => continue,
        }
    }
}

/// Extracts tag names out of a `Tags` attribute formatted as
/// `<python><rust>` (spec §4.6 step 3, `<([^>]+)>` regex in the original).
pub fn split_tags_attribute(tags_attr: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in tags_attr.char_indices() {
        match c {
            '<' => start = Some(i + 1),
            '>' => {
                if let Some(s) = start.take() {
                    out.push(tags_attr[s..i].to_string());
                }
            }
            _ => {}
        }
    }
    out
}
