//! Expansion tree produced by [`parse_word`](super::parse_word) and consumed by
//! [`lower`](super::lower).

use serde::{Deserialize, Serialize};

/// One node of an expanded prompt.
///
/// Trees are acyclic by construction; only reference resolution can cycle, and that is
/// rejected during expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptNode {
    /// A literal phrase
    Text { text: String },
    /// Ordered phrases joined with the phrase separator
    Group { children: Vec<PromptNode> },
    /// Exactly one option is chosen each time the tree is lowered
    Random { options: Vec<PromptNode> },
}

impl PromptNode {
    pub fn text(text: impl Into<String>) -> Self {
        PromptNode::Text { text: text.into() }
    }

    pub fn group(children: Vec<PromptNode>) -> Self {
        PromptNode::Group { children }
    }

    pub fn random(options: Vec<PromptNode>) -> Self {
        PromptNode::Random { options }
    }

    /// True if lowering this tree involves a random choice anywhere.
    pub fn has_random(&self) -> bool {
        match self {
            PromptNode::Text { .. } => false,
            PromptNode::Random { .. } => true,
            PromptNode::Group { children } => children.iter().any(PromptNode::has_random),
        }
    }
}

impl Default for PromptNode {
    fn default() -> Self {
        PromptNode::group(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(PromptNode::text("a"), PromptNode::Text { text: "a".to_string() });
        assert_eq!(PromptNode::default(), PromptNode::Group { children: vec![] });
    }

    #[test]
    fn test_has_random_nested() {
        let flat = PromptNode::group(vec![PromptNode::text("a"), PromptNode::text("b")]);
        assert!(!flat.has_random());

        let nested = PromptNode::group(vec![
            PromptNode::text("a"),
            PromptNode::group(vec![PromptNode::random(vec![PromptNode::text("x")])]),
        ]);
        assert!(nested.has_random());
    }

    #[test]
    fn test_serde_tagged_shape() {
        let node = PromptNode::group(vec![PromptNode::text("a")]);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "group", "children": [{"type": "text", "text": "a"}]})
        );
    }
}
