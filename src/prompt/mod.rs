//! Prompt System - Piece expansion, lowering and phrase combination
//!
//! User prompts are comma/newline separated phrases. A phrase of the form
//! `<library.piece>` refers to a reusable fragment stored in a [`PieceLibrary`]. The pipeline
//! is: [`combine`] the front/middle/back phrase lists, [`parse_word`] each resulting word into
//! a [`PromptNode`] tree, then [`lower`] the tree to the final prompt string.

mod combine;
mod compose;
mod expand;
mod library;
mod loader;
mod lower;
mod node;
mod syntax;

pub use combine::{INTERLEAVE_MARKER, combine};
pub use compose::{PromptRecipe, SlotPiece, compose_prompts};
pub use expand::{PieceRef, is_reference, parse_prompt, parse_reference, parse_word, parse_words};
pub use library::{LibrarySet, Piece, PieceLibrary, PieceLookup, PieceStore};
pub use loader::{LibraryLoader, load_glob, load_library_file, parse_library};
pub use lower::{PHRASE_SEPARATOR, lower, lower_with, reformat, to_phrases};
pub use node::PromptNode;
pub use syntax::check_brackets;
