//! Prompt lowering: collapse an expansion tree into one flat phrase string.
//!
//! Lowering resolves every [`PromptNode::Random`] with a uniform pick, so lowering the same
//! tree twice may give different strings. Repeated samples of one job rely on this to vary
//! their prompts.

use rand::Rng;

use super::node::PromptNode;

/// Separator used when joining lowered phrases.
pub const PHRASE_SEPARATOR: &str = ", ";

/// Split text into trimmed, non-empty phrases on commas and newlines.
pub fn to_phrases(text: &str) -> Vec<String> {
    text.split([',', '\n'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalize separators: `" a,, b ,\nc"` becomes `"a, b, c"`.
pub fn reformat(text: &str) -> String {
    to_phrases(text).join(PHRASE_SEPARATOR)
}

/// Lower a tree using the thread-local RNG.
pub fn lower(node: &PromptNode) -> String {
    lower_with(node, &mut rand::rng())
}

/// Lower a tree with an explicit RNG.
pub fn lower_with<R: Rng + ?Sized>(node: &PromptNode, rng: &mut R) -> String {
    match node {
        PromptNode::Text { text } => text.clone(),
        PromptNode::Random { options } => {
            if options.is_empty() {
                return String::new();
            }
            let pick = rng.random_range(0..options.len());
            lower_with(&options[pick], rng)
        }
        PromptNode::Group { children } => {
            let joined = children
                .iter()
                .map(|child| lower_with(child, rng))
                .collect::<Vec<_>>()
                .join(",");
            reformat(&joined)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_to_phrases_trims_and_drops_empty() {
        assert_eq!(to_phrases(" a ,, b ,\n c\n"), vec!["a", "b", "c"]);
        assert!(to_phrases("").is_empty());
        assert!(to_phrases(" , \n ").is_empty());
    }

    #[test]
    fn test_to_phrases_splits_every_newline() {
        assert_eq!(to_phrases("a\nb\nc"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reformat_idempotent() {
        let once = reformat(" x,y ,\nz");
        assert_eq!(once, "x, y, z");
        assert_eq!(reformat(&once), once);
    }

    #[test]
    fn test_lower_text_verbatim() {
        assert_eq!(lower(&PromptNode::text("  spaced  ")), "  spaced  ");
    }

    #[test]
    fn test_lower_group_reformats() {
        let node = PromptNode::group(vec![
            PromptNode::text("a"),
            PromptNode::text(" b "),
            PromptNode::text(""),
        ]);
        assert_eq!(lower(&node), "a, b");
    }

    #[test]
    fn test_lower_nested_groups_flatten() {
        let node = PromptNode::group(vec![
            PromptNode::text("a"),
            PromptNode::group(vec![PromptNode::text("b"), PromptNode::text("c")]),
            PromptNode::group(vec![]),
            PromptNode::text("d"),
        ]);
        assert_eq!(lower(&node), "a, b, c, d");
    }

    #[test]
    fn test_lower_random_picks_one_option() {
        let node = PromptNode::random(vec![PromptNode::text("x"), PromptNode::text("y")]);
        for _ in 0..50 {
            let out = lower(&node);
            assert!(out == "x" || out == "y");
        }
    }

    #[test]
    fn test_lower_random_covers_all_options() {
        let node = PromptNode::random(vec![
            PromptNode::text("x"),
            PromptNode::text("y"),
            PromptNode::text("z"),
        ]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..300 {
            seen.insert(lower_with(&node, &mut rng));
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_lower_random_empty_options() {
        assert_eq!(lower(&PromptNode::random(vec![])), "");
    }

    #[test]
    fn test_lower_with_seeded_rng_repeatable() {
        let node = PromptNode::group(vec![
            PromptNode::text("base"),
            PromptNode::random(vec![PromptNode::text("x"), PromptNode::text("y")]),
        ]);
        let a = lower_with(&node, &mut StdRng::seed_from_u64(99));
        let b = lower_with(&node, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
        assert!(a.starts_with("base, "));
    }
}
