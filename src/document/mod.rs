pub mod section;

use crate::terminology::text_reference::TextReferenceResolver;
use crate::utils::error::{ClinicalError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

pub use section::{Section, TableRow};

/// Elements nested deeper than this are dropped and the document is
/// flagged malformed; tree walks recurse once per level.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// 精簡的 XML 元素樹；名稱一律為去除 namespace prefix 的 local name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.trim().is_empty())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.child_elements().filter(move |el| el.name == name)
    }

    /// Follows a path of child names, taking the first match at each step.
    pub fn path(&self, names: &[&str]) -> Option<&Element> {
        names
            .iter()
            .try_fold(self, |current, name| current.child(name))
    }

    /// 深度優先、文件順序的所有同名後代
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in self.child_elements() {
            if child.name == name {
                found.push(child);
            }
            child.collect_descendants(name, found);
        }
    }

    pub fn first_descendant(&self, name: &str) -> Option<&Element> {
        for child in self.child_elements() {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.first_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated text content with whitespace collapsed.
    pub fn text(&self) -> String {
        let mut raw = String::new();
        self.push_text(&mut raw);
        collapse_whitespace(&raw)
    }

    fn push_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => {
                    // 區塊元素之間補空白，避免文字黏在一起
                    if matches!(el.name.as_str(), "br" | "td" | "th" | "paragraph" | "item") {
                        out.push(' ');
                    }
                    el.push_text(out);
                    if matches!(el.name.as_str(), "td" | "th" | "paragraph" | "item" | "tr") {
                        out.push(' ');
                    }
                }
            }
        }
    }
}

pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 解析後的臨床文件
#[derive(Debug, Clone)]
pub struct ClinicalDocument {
    root: Element,
    malformed: bool,
    references: TextReferenceResolver,
}

impl ClinicalDocument {
    /// Parses markup text. A reader error part-way through keeps the tree
    /// built so far and flags the document as malformed; only input with no
    /// element at all is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut malformed = false;
        // 超過 MAX_DEPTH 的子樹：只計數開合標籤，不建節點
        let mut skipped_depth = 0usize;

        loop {
            let event = reader.read_event();
            if skipped_depth > 0 {
                match event {
                    Ok(Event::Start(_)) => skipped_depth += 1,
                    Ok(Event::End(_)) => skipped_depth -= 1,
                    Ok(Event::Eof) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("⚠️ Markup error inside dropped subtree: {}", e);
                        break;
                    }
                }
                continue;
            }

            match event {
                Ok(Event::Start(e)) => {
                    if stack.len() >= MAX_DEPTH {
                        if !malformed {
                            tracing::warn!("⚠️ Nesting deeper than {} levels, dropping subtree", MAX_DEPTH);
                        }
                        malformed = true;
                        skipped_depth = 1;
                    } else {
                        stack.push(element_from_start(&e));
                    }
                }
                Ok(Event::Empty(e)) => {
                    if stack.len() >= MAX_DEPTH {
                        malformed = true;
                    } else {
                        let element = element_from_start(&e);
                        attach(&mut stack, &mut root, element);
                    }
                }
                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    push_text(&mut stack, text);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    push_text(&mut stack, text);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Markup error at byte {}: {}; continuing with partial document",
                        reader.buffer_position(),
                        e
                    );
                    malformed = true;
                    break;
                }
            }
            if root.is_some() && stack.is_empty() {
                break;
            }
        }

        if !stack.is_empty() {
            malformed = true;
        }
        // 未關閉的元素併回父節點
        while let Some(element) = stack.pop() {
            attach(&mut stack, &mut root, element);
        }

        let root = root.ok_or_else(|| ClinicalError::DocumentMalformed {
            message: "no root element found".to_string(),
        })?;

        let references = TextReferenceResolver::from_root(&root);

        Ok(Self {
            root,
            malformed,
            references,
        })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// Narrative text for an anchor id, with or without the leading `#`.
    pub fn anchor_text(&self, anchor: &str) -> Option<&str> {
        self.references.resolve(anchor)
    }

    pub fn text_references(&self) -> &TextReferenceResolver {
        &self.references
    }

    /// 文件順序的所有 section（含巢狀）
    pub fn sections(&self) -> Vec<Section<'_>> {
        let mut sections = Vec::new();
        if self.root.name == "section" {
            sections.push(Section::new(&self.root, self));
        }
        sections.extend(
            self.root
                .descendants("section")
                .into_iter()
                .map(|el| Section::new(el, self)),
        );
        sections
    }

    pub fn find_sections(&self, codes: &[&str]) -> Vec<Section<'_>> {
        self.sections()
            .into_iter()
            .filter(|section| {
                section
                    .code()
                    .map(|code| codes.iter().any(|c| c.eq_ignore_ascii_case(code)))
                    .unwrap_or(false)
            })
            .collect()
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Element {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut element = Element::new(&name);
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        element.attributes.push((key, value));
    }
    element
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn push_text(stack: &mut [Element], text: String) {
    if text.trim().is_empty() {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Text(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
<ClinicalDocument xmlns="urn:hl7-org:v3" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <component><structuredBody>
    <component>
      <section>
        <code code="48765-2" codeSystem="2.16.840.1.113883.6.1"/>
        <title>Allergies</title>
        <text><content ID="agent-1">Penicillin &amp; derivatives</content></text>
        <entry><observation><value xsi:type="CD" code="1"/></observation></entry>
      </section>
    </component>
  </structuredBody></component>
</ClinicalDocument>"#;

    #[test]
    fn test_parse_strips_prefixes_and_collects_anchors() {
        let doc = ClinicalDocument::parse(DOC).unwrap();
        assert!(!doc.is_malformed());
        assert_eq!(doc.root().name, "ClinicalDocument");
        assert_eq!(doc.anchor_text("#agent-1"), Some("Penicillin & derivatives"));

        let value = doc.root().first_descendant("value").unwrap();
        assert_eq!(value.attr("type"), Some("CD"));
    }

    #[test]
    fn test_find_sections_by_code() {
        let doc = ClinicalDocument::parse(DOC).unwrap();
        assert_eq!(doc.find_sections(&["48765-2"]).len(), 1);
        assert!(doc.find_sections(&["10160-0"]).is_empty());
    }

    #[test]
    fn test_truncated_document_is_recovered() {
        let truncated = &DOC[..DOC.find("</section>").unwrap()];
        let doc = ClinicalDocument::parse(truncated).unwrap();
        assert!(doc.is_malformed());
        assert_eq!(doc.find_sections(&["48765-2"]).len(), 1);
    }

    #[test]
    fn test_plain_text_is_rejected() {
        let err = ClinicalDocument::parse("just some words").unwrap_err();
        assert!(matches!(err, ClinicalError::DocumentMalformed { .. }));
    }

    #[test]
    fn test_deep_nesting_is_cut_off() {
        let depth = 200_000;
        let text = format!(
            "<ClinicalDocument>{}deep{}<section><code code=\"48765-2\"/></section></ClinicalDocument>",
            "<a>".repeat(depth),
            "</a>".repeat(depth)
        );
        let doc = ClinicalDocument::parse(&text).unwrap();
        assert!(doc.is_malformed());
        assert!(doc.root().descendants("a").len() < MAX_DEPTH);
        assert_eq!(doc.root().text(), "");
        // 被截斷的子樹之後的內容仍被讀取
        assert_eq!(doc.find_sections(&["48765-2"]).len(), 1);
    }

    #[test]
    fn test_text_collapses_whitespace() {
        let doc = ClinicalDocument::parse("<p>  a\n   <b>b</b>\t c </p>").unwrap();
        assert_eq!(doc.root().text(), "a b c");
    }
}
