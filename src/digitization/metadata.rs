//! MARCXML export for one box.
//!
//! Every located artifact becomes a web-link field (`856 4_`) carrying the
//! URL in `$u` and the artifact kind in `$q`. This is the only schema the
//! builder emits; the FFT attachment convention found in legacy records is
//! rewritten into this form by [`crate::digitization::legacy`].

use crate::digitization::locator::{FileType, ResolvedRecord};
use anyhow::Result;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::collections::BTreeMap;

pub struct FieldMapping {
    pub tag: &'static str,
    pub ind1: &'static str,
    pub ind2: &'static str,
    pub url_code: &'static str,
    pub label_code: &'static str,
}

pub const WEB_LINK: FieldMapping = FieldMapping {
    tag: "856",
    ind1: "4",
    ind2: " ",
    url_code: "u",
    label_code: "q",
};

pub const RECORD_ID_TAG: &str = "001";

pub fn label(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Pdf => "PDF",
        FileType::PdfText => "PDF_LATEX",
        FileType::TiffSet => "TIFF",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RecordKey {
    Numeric(u64, String),
    Text(String),
}

impl RecordKey {
    fn of(record_id: &str) -> Self {
        match record_id.trim().parse::<u64>() {
            Ok(n) => Self::Numeric(n, record_id.to_string()),
            Err(_) => Self::Text(record_id.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuiltCollection {
    pub xml: Vec<u8>,
    pub records_written: usize,
    /// Record ids left out because nothing was located for them.
    pub skipped: Vec<String>,
}

fn write_text_element<'a>(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'a>,
    text: &str,
) -> Result<()> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_record(writer: &mut Writer<Vec<u8>>, record: &ResolvedRecord) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("record")))?;
    write_text_element(
        writer,
        BytesStart::new("controlfield").with_attributes([("tag", RECORD_ID_TAG)]),
        &record.record_id,
    )?;

    for ft in FileType::ALL {
        for url in record.urls(ft) {
            writer.write_event(Event::Start(BytesStart::new("datafield").with_attributes([
                ("tag", WEB_LINK.tag),
                ("ind1", WEB_LINK.ind1),
                ("ind2", WEB_LINK.ind2),
            ])))?;
            write_text_element(
                writer,
                BytesStart::new("subfield").with_attributes([("code", WEB_LINK.url_code)]),
                url,
            )?;
            write_text_element(
                writer,
                BytesStart::new("subfield").with_attributes([("code", WEB_LINK.label_code)]),
                label(ft),
            )?;
            writer.write_event(Event::End(BytesEnd::new("datafield")))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("record")))?;
    Ok(())
}

/// Serializes one `<collection>` for a box. Later rows win over earlier
/// rows with the same record id; output is ordered by record id.
pub fn build_collection(records: &[ResolvedRecord]) -> Result<BuiltCollection> {
    let mut by_id: BTreeMap<RecordKey, &ResolvedRecord> = BTreeMap::new();
    for record in records {
        by_id.insert(RecordKey::of(&record.record_id), record);
    }

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("collection")))?;

    let mut records_written = 0usize;
    let mut skipped = Vec::new();
    for record in by_id.values() {
        if !record.has_any_url() {
            skipped.push(record.record_id.clone());
            continue;
        }
        write_record(&mut writer, record)?;
        records_written += 1;
    }

    writer.write_event(Event::End(BytesEnd::new("collection")))?;
    let mut xml = writer.into_inner();
    xml.push(b'\n');

    Ok(BuiltCollection {
        xml,
        records_written,
        skipped,
    })
}
