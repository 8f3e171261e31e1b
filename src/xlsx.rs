//! Minimal OOXML spreadsheet support.
//!
//! Writes single-sheet `.xlsx` workbooks (header row, numeric cells, inline
//! strings) and reads the first worksheet of an existing workbook back as
//! text cells. Reading understands shared strings, inline strings and plain
//! values; styles, formulas and dates are ignored.
//!
//! Characters XML 1.0 cannot carry (most C0 controls) are written as OOXML
//! `_xHHHH_` escapes and decoded again on read.

use std::borrow::Cow;
use std::io::{Read, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::XlsxError;
use crate::models::{ResultTable, Scalar};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// Encode `table` as an `.xlsx` workbook into `out`.
pub fn write_workbook<W: Write + std::io::Seek>(out: W, table: &ResultTable) -> Result<(), XlsxError> {
    let mut zip = zip::ZipWriter::new(out);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let parts: [(&str, &str); 4] = [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
    ];
    for (name, body) in parts {
        zip.start_file(name, options)
            .map_err(|e| XlsxError::Zip(e.to_string()))?;
        zip.write_all(body.as_bytes())?;
    }

    zip.start_file("xl/worksheets/sheet1.xml", options)
        .map_err(|e| XlsxError::Zip(e.to_string()))?;
    write_sheet(&mut zip, table)?;

    zip.finish().map_err(|e| XlsxError::Zip(e.to_string()))?;
    Ok(())
}

fn xml_err<E: std::fmt::Display>(e: E) -> XlsxError {
    XlsxError::Xml(e.to_string())
}

fn write_sheet<W: Write>(out: W, table: &ResultTable) -> Result<(), XlsxError> {
    let mut writer = Writer::new(out);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(xml_err)?;

    let mut worksheet = BytesStart::new("worksheet");
    worksheet.push_attribute((
        "xmlns",
        "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
    ));
    writer.write_event(Event::Start(worksheet)).map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("sheetData")))
        .map_err(xml_err)?;

    let header: Vec<Scalar> = table
        .columns()
        .iter()
        .map(|c| Scalar::Text(c.clone()))
        .collect();
    write_row(&mut writer, 1, &header)?;
    for (i, row) in table.rows().iter().enumerate() {
        write_row(&mut writer, i + 2, row)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("sheetData")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("worksheet")))
        .map_err(xml_err)?;
    Ok(())
}

fn write_row<W: Write>(writer: &mut Writer<W>, number: usize, cells: &[Scalar]) -> Result<(), XlsxError> {
    let number_text = number.to_string();
    let mut row = BytesStart::new("row");
    row.push_attribute(("r", number_text.as_str()));
    writer.write_event(Event::Start(row)).map_err(xml_err)?;

    for (col, value) in cells.iter().enumerate() {
        let reference = format!("{}{}", column_letters(col), number);
        match value {
            Scalar::Null => continue,
            Scalar::Float(v) if !v.is_finite() => continue,
            Scalar::Int(_) | Scalar::Float(_) => {
                let mut cell = BytesStart::new("c");
                cell.push_attribute(("r", reference.as_str()));
                writer.write_event(Event::Start(cell)).map_err(xml_err)?;
                writer
                    .write_event(Event::Start(BytesStart::new("v")))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::Text(BytesText::new(&value.render())))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("v")))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("c")))
                    .map_err(xml_err)?;
            }
            Scalar::Text(text) => {
                let mut cell = BytesStart::new("c");
                cell.push_attribute(("r", reference.as_str()));
                cell.push_attribute(("t", "inlineStr"));
                writer.write_event(Event::Start(cell)).map_err(xml_err)?;
                writer
                    .write_event(Event::Start(BytesStart::new("is")))
                    .map_err(xml_err)?;
                let mut t = BytesStart::new("t");
                t.push_attribute(("xml:space", "preserve"));
                writer.write_event(Event::Start(t)).map_err(xml_err)?;
                writer
                    .write_event(Event::Text(BytesText::new(&escape_ooxml(text))))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("t")))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("is")))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("c")))
                    .map_err(xml_err)?;
            }
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("row")))
        .map_err(xml_err)?;
    Ok(())
}

fn forbidden_in_xml(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
}

/// Length in bytes of an `_xHHHH_` escape at the start of `s`, if any.
fn escape_at(s: &str) -> Option<(usize, u32)> {
    let b = s.as_bytes();
    if b.len() < 7 || &b[..2] != b"_x" || b[6] != b'_' {
        return None;
    }
    let hex = s.get(2..6)?;
    if !hex.bytes().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().map(|code| (7, code))
}

/// Encode `text` for a `<t>` element. A literal `_xHHHH_` in the input has
/// its underscore escaped so it survives the round trip.
fn escape_ooxml(text: &str) -> Cow<'_, str> {
    if !text.chars().any(forbidden_in_xml) && !text.contains("_x") {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for (i, c) in text.char_indices() {
        if forbidden_in_xml(c) {
            out.push_str(&format!("_x{:04X}_", c as u32));
        } else if c == '_' && escape_at(&text[i..]).is_some() {
            out.push_str("_x005F_");
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

fn unescape_ooxml(text: &str) -> Cow<'_, str> {
    if !text.contains("_x") {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("_x") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match escape_at(rest).and_then(|(len, code)| char::from_u32(code).map(|c| (len, c))) {
            Some((len, c)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push_str("_x");
                rest = &rest[2..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Zero-based column index → spreadsheet letters (`0` → `A`, `26` → `AA`).
pub fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Spreadsheet letters at the start of a cell reference → zero-based index.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for b in letters {
        index = index * 26 + usize::from(b - b'A' + 1);
    }
    Some(index - 1)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<Vec<u8>>, XlsxError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(XlsxError::Zip(e.to_string())),
    };
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(XlsxError::Zip(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(Some(out))
}

/// Read the first worksheet as rows of text cells (empty string for gaps).
pub fn read_first_sheet(bytes: &[u8]) -> Result<Vec<Vec<String>>, XlsxError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| XlsxError::Zip(e.to_string()))?;

    let shared_strings = match read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let mut sheet_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    sheet_names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    let Some(first) = sheet_names.first() else {
        return Err(XlsxError::Zip("workbook has no worksheets".to_string()));
    };
    let first = first.clone();
    let xml = read_zip_entry_bounded(&mut archive, &first)?
        .ok_or_else(|| XlsxError::Zip(format!("{} missing", first)))?;
    parse_sheet(&xml, &shared_strings)
}

fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, XlsxError> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(xml_err)?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => {
                    let text = current.take().unwrap_or_default();
                    strings.push(unescape_ooxml(&text).into_owned());
                }
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Plain,
}

fn parse_sheet(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>, XlsxError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut row: Option<Vec<String>> = None;
    let mut cell_col = 0usize;
    let mut cell_kind = CellKind::Plain;
    let mut cell_text: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row = Some(Vec::new()),
                b"c" => {
                    let mut kind = CellKind::Plain;
                    let mut col = row.as_ref().map(|r| r.len()).unwrap_or(0);
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"r" => {
                                if let Some(idx) =
                                    column_index(&String::from_utf8_lossy(&attr.value))
                                {
                                    col = idx;
                                }
                            }
                            b"t" if attr.value.as_ref() == b"s" => kind = CellKind::Shared,
                            _ => {}
                        }
                    }
                    cell_col = col;
                    cell_kind = kind;
                    cell_text = Some(String::new());
                }
                b"v" | b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                if let Some(s) = cell_text.as_mut() {
                    s.push_str(&te.unescape().map_err(xml_err)?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_text = false,
                b"c" => {
                    let raw = cell_text.take().unwrap_or_default();
                    let value = if cell_kind == CellKind::Shared {
                        raw.trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i).cloned())
                            .unwrap_or_default()
                    } else {
                        unescape_ooxml(&raw).into_owned()
                    };
                    if let Some(r) = row.as_mut() {
                        if r.len() <= cell_col {
                            r.resize(cell_col + 1, String::new());
                        }
                        r[cell_col] = value;
                    }
                }
                b"row" => {
                    if let Some(r) = row.take() {
                        rows.push(r);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}
