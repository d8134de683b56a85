use super::{collapse_whitespace, ClinicalDocument, Element, Node};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub cells: Vec<String>,
}

impl TableRow {
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells
            .get(index)
            .map(String::as_str)
            .filter(|cell| !cell.trim().is_empty())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|cell| cell.trim().is_empty())
    }
}

/// 文件中的一個 section；保留對文件的參照以解析敘述錨點
#[derive(Debug, Clone, Copy)]
pub struct Section<'a> {
    element: &'a Element,
    document: &'a ClinicalDocument,
}

impl<'a> Section<'a> {
    pub fn new(element: &'a Element, document: &'a ClinicalDocument) -> Self {
        Self { element, document }
    }

    pub fn element(&self) -> &'a Element {
        self.element
    }

    pub fn code(&self) -> Option<&'a str> {
        self.element.child("code").and_then(|code| code.attr("code"))
    }

    pub fn title(&self) -> Option<String> {
        self.element
            .child("title")
            .map(|title| title.text())
            .filter(|title| !title.is_empty())
    }

    pub fn entries(&self) -> Vec<&'a Element> {
        self.element.children_named("entry").collect()
    }

    pub fn narrative(&self) -> Option<&'a Element> {
        self.element.child("text")
    }

    /// Resolves `<reference value="#id"/>` under `element` (directly or via
    /// `originalText`) to the anchor id and its narrative text.
    pub fn reference_of(&self, element: &Element) -> Option<(String, Option<String>)> {
        let reference = element
            .path(&["originalText", "reference"])
            .or_else(|| element.child("reference"))
            .or_else(|| element.path(&["text", "reference"]))?;
        let anchor = reference.attr("value")?.trim_start_matches('#').to_string();
        let text = self.document.anchor_text(&anchor).map(str::to_string);
        Some((anchor, text))
    }

    pub fn anchor_text(&self, anchor: &str) -> Option<&'a str> {
        self.document.anchor_text(anchor)
    }

    /// 敘述區塊中所有表格列（含 thead），依文件順序
    pub fn table_rows(&self) -> Vec<TableRow> {
        let Some(narrative) = self.narrative() else {
            return Vec::new();
        };
        narrative
            .descendants("table")
            .into_iter()
            .flat_map(|table| table.descendants("tr"))
            .map(|tr| TableRow {
                cells: tr
                    .child_elements()
                    .filter(|cell| cell.name == "td" || cell.name == "th")
                    .map(|cell| cell.text())
                    .collect(),
            })
            .filter(|row| !row.is_blank())
            .collect()
    }

    /// Prose lines outside tables: paragraphs, list items, loose content
    /// and bare text split on line breaks.
    pub fn narrative_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(narrative) = self.narrative() {
            collect_lines(narrative, &mut lines);
        }
        lines.retain(|line| !line.is_empty());
        lines
    }
}

fn collect_lines(element: &Element, lines: &mut Vec<String>) {
    for node in &element.children {
        match node {
            Node::Text(text) => {
                lines.extend(text.lines().map(collapse_whitespace));
            }
            Node::Element(child) => match child.name.as_str() {
                "table" | "caption" | "footnote" => {}
                "paragraph" | "content" => {
                    if child.child("list").is_some() || child.child("paragraph").is_some() {
                        collect_lines(child, lines);
                    } else {
                        lines.push(child.text());
                    }
                }
                "item" => {
                    if child.child("list").is_some() {
                        collect_lines(child, lines);
                    } else {
                        lines.push(child.text());
                    }
                }
                _ => collect_lines(child, lines),
            },
        }
    }
}
