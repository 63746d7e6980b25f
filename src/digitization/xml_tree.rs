//! Owned element tree over `quick_xml` events.
//!
//! Only what single-record MARCXML needs: elements, attributes, text,
//! CDATA, comments and processing instructions. Whitespace text is kept so
//! a parse/serialize cycle preserves the original layout.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlTreeError {
    #[error("xml parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },
    #[error("document has no root element")]
    NoRoot,
    #[error("document has more than one root element")]
    MultipleRoots,
    #[error("element `{0}` is never closed")]
    Unclosed(String),
    #[error("text outside the root element")]
    StrayText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .rsplit_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.name)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets `key`, keeping its original position when already present.
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attributes.push((key.to_string(), value.to_string())),
        }
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children = vec![Node::Text(text.to_string())];
        self
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// Concatenated direct text and CDATA content.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                _ => {}
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
}

fn parse_error<R>(reader: &Reader<R>, message: impl ToString) -> XmlTreeError {
    XmlTreeError::Parse {
        position: reader.buffer_position() as u64,
        message: message.to_string(),
    }
}

fn element_from_start(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> Result<Element, XmlTreeError> {
    let mut el = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|err| parse_error(reader, err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| parse_error(reader, err))?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, node: Node) -> Result<(), XmlTreeError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    match node {
        Node::Element(el) => {
            if root.is_some() {
                return Err(XmlTreeError::MultipleRoots);
            }
            *root = Some(el);
            Ok(())
        }
        Node::Text(t) if !t.trim().is_empty() => Err(XmlTreeError::StrayText),
        // Prolog/epilog whitespace, comments and PIs are not kept.
        _ => Ok(()),
    }
}

pub fn parse(raw: &str) -> Result<Document, XmlTreeError> {
    let mut reader = Reader::from_str(raw);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|err| parse_error(&reader, err))?;
        match event {
            Event::Start(start) => {
                let el = element_from_start(&reader, &start)?;
                stack.push(el);
            }
            Event::Empty(start) => {
                let el = element_from_start(&reader, &start)?;
                attach(&mut stack, &mut root, Node::Element(el))?;
            }
            Event::End(_) => {
                let Some(el) = stack.pop() else {
                    return Err(parse_error(&reader, "closing tag without opening tag"));
                };
                attach(&mut stack, &mut root, Node::Element(el))?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|err| parse_error(&reader, err))?
                    .into_owned();
                attach(&mut stack, &mut root, Node::Text(text))?;
            }
            Event::CData(data) => {
                let data = String::from_utf8_lossy(&data).into_owned();
                attach(&mut stack, &mut root, Node::CData(data))?;
            }
            Event::Comment(comment) => {
                let comment = String::from_utf8_lossy(&comment).into_owned();
                attach(&mut stack, &mut root, Node::Comment(comment))?;
            }
            Event::PI(pi) => {
                let pi = String::from_utf8_lossy(&pi).into_owned();
                attach(&mut stack, &mut root, Node::ProcessingInstruction(pi))?;
            }
            Event::Decl(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlTreeError::Unclosed(open.name));
    }
    root.map(|root| Document { root }).ok_or(XmlTreeError::NoRoot)
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> std::io::Result<()> {
    match node {
        Node::Element(el) => write_element(writer, el),
        Node::Text(text) => writer.write_event(Event::Text(BytesText::from_escaped(
            partial_escape(text.as_str()),
        ))),
        Node::CData(data) => writer.write_event(Event::CData(BytesCData::new(data.as_str()))),
        Node::Comment(comment) => {
            writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))
        }
        Node::ProcessingInstruction(pi) => writer.write_event(Event::PI(BytesPI::new(pi.as_str()))),
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> std::io::Result<()> {
    let start = BytesStart::new(el.name.as_str()).with_attributes(
        el.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str())),
    );
    if el.children.is_empty() {
        return writer.write_event(Event::Empty(start));
    }
    writer.write_event(Event::Start(start))?;
    for child in &el.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))
}

/// UTF-8 declaration, the root element, and a trailing newline.
pub fn serialize(doc: &Document) -> std::io::Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer.get_mut().extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_element(&mut writer, &doc.root)?;
    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}
