//! Scene prompt composition.
//!
//! A scene has ordered slots, each holding candidate pieces. Every combination of one enabled
//! piece per slot becomes one prompt: the chosen pieces form the middle list, which is
//! interleaved into the front template and followed by the back template.

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::combine::combine;
use super::expand::parse_words;
use super::library::PieceStore;
use super::lower::to_phrases;
use super::node::PromptNode;

/// One candidate piece in a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPiece {
    pub prompt: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SlotPiece {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            enabled: true,
        }
    }

    pub fn disabled(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            enabled: false,
        }
    }
}

/// Front/back templates plus the scene's slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptRecipe {
    pub front: String,
    pub back: String,
    pub slots: Vec<Vec<SlotPiece>>,
}

impl PromptRecipe {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
            slots: Vec::new(),
        }
    }

    pub fn with_slot(mut self, slot: Vec<SlotPiece>) -> Self {
        self.slots.push(slot);
        self
    }

    /// Number of prompts [`compose_prompts`] will produce.
    pub fn combination_count(&self) -> usize {
        self.slots
            .iter()
            .map(|slot| slot.iter().filter(|p| p.enabled).count())
            .product()
    }
}

/// Expand every slot combination of `recipe` into a prompt tree.
///
/// Combinations are produced in slot order with the first slot varying slowest. Any template
/// error aborts the whole composition.
pub fn compose_prompts<S>(recipe: &PromptRecipe, store: &S) -> Result<Vec<PromptNode>>
where
    S: PieceStore + ?Sized,
{
    let front = to_phrases(&recipe.front);
    let back = to_phrases(&recipe.back);
    let mut chosen: Vec<&str> = Vec::with_capacity(recipe.slots.len());
    let mut out = Vec::new();
    walk(recipe, store, &front, &back, &mut chosen, &mut out)?;
    tracing::debug!(prompts = out.len(), slots = recipe.slots.len(), "Composed scene prompts");
    Ok(out)
}

fn walk<'r, S>(
    recipe: &'r PromptRecipe,
    store: &S,
    front: &[String],
    back: &[String],
    chosen: &mut Vec<&'r str>,
    out: &mut Vec<PromptNode>,
) -> Result<()>
where
    S: PieceStore + ?Sized,
{
    let level = chosen.len();
    if level == recipe.slots.len() {
        let middle: Vec<String> = chosen.iter().flat_map(|p| to_phrases(p)).collect();
        let words = combine(front, middle.as_slice(), back);
        out.push(parse_words(&words, store)?);
        return Ok(());
    }
    for piece in recipe.slots[level].iter().filter(|p| p.enabled) {
        chosen.push(&piece.prompt);
        walk(recipe, store, front, back, chosen, out)?;
        chosen.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoomError;
    use crate::prompt::library::{LibrarySet, Piece, PieceLibrary};
    use crate::prompt::lower::lower;

    fn store() -> LibrarySet {
        LibrarySet::new().with_library(PieceLibrary::new("pose").with_piece("sit", Piece::new("sitting, on chair")))
    }

    #[test]
    fn test_no_slots_yields_single_prompt() {
        let recipe = PromptRecipe::new("1girl, |, solo", "best quality");
        let prompts = compose_prompts(&recipe, &store()).unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(lower(&prompts[0]), "1girl, solo, best quality");
    }

    #[test]
    fn test_cartesian_product_in_slot_order() {
        let recipe = PromptRecipe::new("front", "back")
            .with_slot(vec![SlotPiece::new("a"), SlotPiece::new("b")])
            .with_slot(vec![SlotPiece::new("x"), SlotPiece::new("y")]);
        assert_eq!(recipe.combination_count(), 4);

        let lowered: Vec<String> = compose_prompts(&recipe, &store())
            .unwrap()
            .iter()
            .map(lower)
            .collect();
        assert_eq!(
            lowered,
            vec![
                "front, a, x, back",
                "front, a, y, back",
                "front, b, x, back",
                "front, b, y, back"
            ]
        );
    }

    #[test]
    fn test_disabled_pieces_skipped() {
        let recipe = PromptRecipe::new("", "")
            .with_slot(vec![SlotPiece::disabled("a"), SlotPiece::new("b")]);
        let prompts = compose_prompts(&recipe, &store()).unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(lower(&prompts[0]), "b");
    }

    #[test]
    fn test_slot_with_nothing_enabled_yields_nothing() {
        let recipe = PromptRecipe::new("front", "").with_slot(vec![SlotPiece::disabled("a")]);
        assert_eq!(recipe.combination_count(), 0);
        assert!(compose_prompts(&recipe, &store()).unwrap().is_empty());
    }

    #[test]
    fn test_marker_splices_slot_pieces_and_expands_references() {
        let recipe = PromptRecipe::new("1girl, |, indoors", "masterpiece")
            .with_slot(vec![SlotPiece::new("<pose.sit>, smile")]);
        let prompts = compose_prompts(&recipe, &store()).unwrap();
        assert_eq!(lower(&prompts[0]), "1girl, sitting, on chair, smile, indoors, masterpiece");
    }

    #[test]
    fn test_template_error_aborts() {
        let recipe = PromptRecipe::new("<pose.missing>", "").with_slot(vec![SlotPiece::new("a")]);
        let err = compose_prompts(&recipe, &store()).unwrap_err();
        assert!(matches!(err, LoomError::UnknownPiece(_)));
    }

    #[test]
    fn test_recipe_yaml_enabled_default() {
        let recipe: PromptRecipe = serde_yaml::from_str(
            "front: a\nslots:\n  - - prompt: x\n    - prompt: y\n      enabled: false\n",
        )
        .unwrap();
        assert!(recipe.slots[0][0].enabled);
        assert!(!recipe.slots[0][1].enabled);
        assert_eq!(recipe.back, "");
    }
}
