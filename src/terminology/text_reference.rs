use crate::document::Element;
use std::collections::HashMap;

/// 敘述錨點 id → 文字（同一份文件內）
#[derive(Debug, Clone, Default)]
pub struct TextReferenceResolver {
    anchors: HashMap<String, String>,
}

impl TextReferenceResolver {
    pub fn new(anchors: HashMap<String, String>) -> Self {
        Self { anchors }
    }

    /// Indexes every element carrying an `ID` attribute. The first
    /// occurrence of a duplicated id wins.
    pub fn from_root(root: &Element) -> Self {
        let mut anchors = HashMap::new();
        collect(root, &mut anchors);
        Self { anchors }
    }

    /// Accepts `#id` or `id`.
    pub fn resolve(&self, anchor: &str) -> Option<&str> {
        self.anchors
            .get(anchor.trim().trim_start_matches('#'))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

fn collect(element: &Element, anchors: &mut HashMap<String, String>) {
    if let Some(id) = element.attr("ID") {
        let text = element.text();
        if !text.is_empty() {
            anchors.entry(id.to_string()).or_insert(text);
        }
    }
    for child in element.child_elements() {
        collect(child, anchors);
    }
}
