//! Prompt expansion: resolve `<library.piece>` references into a [`PromptNode`] tree.
//!
//! A token that is not wrapped in angle brackets is a literal phrase. A wrapped token must
//! name exactly one library and one piece separated by a single dot. Normal pieces expand to
//! a group of their phrases; multi pieces expand to a random choice between their lines.
//!
//! The visited set is shared across the whole descent of one top-level call and is never
//! unmarked, so a piece may appear at most once per top-level word. Referencing it a second
//! time, even from a sibling branch, is reported as a cycle.

use std::collections::HashSet;

use crate::error::{LoomError, Result};

use super::library::{PieceLookup, PieceStore};
use super::lower::to_phrases;
use super::node::PromptNode;

/// A parsed `<library.piece>` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceRef<'a> {
    pub library: &'a str,
    pub piece: &'a str,
}

/// True if the token is wrapped in `<` and `>`.
pub fn is_reference(token: &str) -> bool {
    token.len() >= 2 && token.starts_with('<') && token.ends_with('>')
}

/// Parse the inside of a bracketed token.
///
/// Returns `Ok(None)` for plain tokens and `MalformedReference` when the brackets do not
/// contain exactly `library.piece`.
pub fn parse_reference(token: &str) -> Result<Option<PieceRef<'_>>> {
    if !is_reference(token) {
        return Ok(None);
    }
    let inner = &token[1..token.len() - 1];
    let mut parts = inner.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(library), Some(piece), None) => Ok(Some(PieceRef { library, piece })),
        _ => Err(LoomError::MalformedReference(token.to_string())),
    }
}

/// Expand a single token.
///
/// `visited` holds every reference token already entered during this expansion; pass a
/// fresh set for each top-level word.
pub fn parse_word<S>(token: &str, store: &S, visited: &mut HashSet<String>) -> Result<PromptNode>
where
    S: PieceStore + ?Sized,
{
    let Some(reference) = parse_reference(token)? else {
        return Ok(PromptNode::text(token));
    };

    let piece = match store.lookup(reference.library, reference.piece) {
        PieceLookup::Found(piece) => piece,
        PieceLookup::NoLibrary => return Err(LoomError::UnknownLibrary(token.to_string())),
        PieceLookup::NoPiece => return Err(LoomError::UnknownPiece(token.to_string())),
    };

    if !visited.insert(token.to_string()) {
        return Err(LoomError::CyclicReference(token.to_string()));
    }

    if piece.multi {
        let mut options = Vec::new();
        // Blank lines are skipped, not kept as empty options
        for line in piece.prompt.lines().filter(|l| !l.trim().is_empty()) {
            options.push(expand_phrases(line, store, visited)?);
        }
        tracing::trace!(reference = token, options = options.len(), "Expanded multi piece");
        Ok(PromptNode::group(vec![PromptNode::random(options)]))
    } else {
        expand_phrases(&piece.prompt, store, visited)
    }
}

/// Expand a whole prompt string, one top-level expansion per phrase.
pub fn parse_prompt<S>(text: &str, store: &S) -> Result<PromptNode>
where
    S: PieceStore + ?Sized,
{
    parse_words(&to_phrases(text), store)
}

/// Expand already-split words into a single group, one top-level expansion per word.
pub fn parse_words<S, W>(words: &[W], store: &S) -> Result<PromptNode>
where
    S: PieceStore + ?Sized,
    W: AsRef<str>,
{
    let mut children = Vec::with_capacity(words.len());
    for word in words {
        let mut visited = HashSet::new();
        children.push(parse_word(word.as_ref(), store, &mut visited)?);
    }
    Ok(PromptNode::group(children))
}

fn expand_phrases<S>(text: &str, store: &S, visited: &mut HashSet<String>) -> Result<PromptNode>
where
    S: PieceStore + ?Sized,
{
    let mut children = Vec::new();
    for phrase in to_phrases(text) {
        children.push(parse_word(&phrase, store, visited)?);
    }
    Ok(PromptNode::group(children))
}
