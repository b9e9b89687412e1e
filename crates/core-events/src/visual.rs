//! Visual node tree exchanged with the display layer.
//!
//! A well formed document is a root [`VisualNode::Group`] whose children are
//! spacers and line nodes; every line node holds only text leaves. Anything
//! else (a line inside a line, text outside any line) is accepted on input
//! and left for the reconciler to flag.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum VisualNode {
    /// Empty block standing in for lines that are not materialized.
    Spacer { height_px: f64 },
    /// One buffer line.
    Line {
        #[serde(default)]
        children: Vec<VisualNode>,
    },
    Text { text: String },
    Group {
        #[serde(default)]
        children: Vec<VisualNode>,
    },
}

impl VisualNode {
    /// Line node holding a single text leaf.
    pub fn line(text: impl Into<String>) -> Self {
        VisualNode::Line {
            children: vec![VisualNode::Text { text: text.into() }],
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        VisualNode::Text { text: text.into() }
    }

    pub fn spacer(height_px: f64) -> Self {
        VisualNode::Spacer { height_px }
    }

    pub fn group(children: Vec<VisualNode>) -> Self {
        VisualNode::Group { children }
    }

    pub fn children(&self) -> &[VisualNode] {
        match self {
            VisualNode::Line { children } | VisualNode::Group { children } => children,
            VisualNode::Spacer { .. } | VisualNode::Text { .. } => &[],
        }
    }

    /// Number of line nodes anywhere in the tree.
    pub fn line_count(&self) -> usize {
        let own = usize::from(matches!(self, VisualNode::Line { .. }));
        own + self.children().iter().map(VisualNode::line_count).sum::<usize>()
    }

    /// Concatenate every text leaf below this node, depth first.
    pub fn flat_text(&self, out: &mut String) {
        match self {
            VisualNode::Text { text } => out.push_str(text),
            VisualNode::Spacer { .. } => {}
            VisualNode::Line { children } | VisualNode::Group { children } => {
                for child in children {
                    child.flat_text(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape_is_tagged_by_kind() {
        let doc = VisualNode::group(vec![VisualNode::spacer(40.0), VisualNode::line("a")]);
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"group","children":[{"kind":"spacer","heightPx":40.0},{"kind":"line","children":[{"kind":"text","text":"a"}]}]}"#
        );
        let back: VisualNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn line_without_children_parses() {
        let node: VisualNode = serde_json::from_str(r#"{"kind":"line"}"#).unwrap();
        assert_eq!(node, VisualNode::Line { children: vec![] });
    }

    #[test]
    fn flat_text_skips_spacers() {
        let doc = VisualNode::group(vec![
            VisualNode::line("x"),
            VisualNode::spacer(20.0),
            VisualNode::text("y"),
        ]);
        let mut out = String::new();
        doc.flat_text(&mut out);
        assert_eq!(out, "xy");
        assert_eq!(doc.line_count(), 1);
    }
}
