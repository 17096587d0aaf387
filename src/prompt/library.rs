//! Piece libraries and the lookup interface the expansion engine reads from.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// A named, reusable prompt fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    /// Prompt text; phrases separated by commas or newlines
    pub prompt: String,
    /// When set, one line of `prompt` is picked at random on every lowering
    #[serde(default)]
    pub multi: bool,
}

impl Piece {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            multi: false,
        }
    }

    pub fn multi(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            multi: true,
        }
    }
}

/// A named collection of pieces, referenced as `<library.piece>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceLibrary {
    pub name: String,
    #[serde(default)]
    pub pieces: BTreeMap<String, Piece>,
}

impl PieceLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pieces: BTreeMap::new(),
        }
    }

    /// Builder-style insert
    pub fn with_piece(mut self, name: impl Into<String>, piece: Piece) -> Self {
        self.pieces.insert(name.into(), piece);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, piece: Piece) {
        self.pieces.insert(name.into(), piece);
    }

    pub fn get(&self, name: &str) -> Option<&Piece> {
        self.pieces.get(name)
    }
}

/// Result of a [`PieceStore`] lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PieceLookup<'a> {
    Found(&'a Piece),
    NoLibrary,
    NoPiece,
}

/// Read-only source of pieces for the expansion engine.
pub trait PieceStore {
    fn lookup(&self, library: &str, piece: &str) -> PieceLookup<'_>;
}

/// In-memory set of libraries keyed by name.
#[derive(Debug, Clone, Default)]
pub struct LibrarySet {
    libraries: HashMap<String, PieceLibrary>,
}

impl LibrarySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a library, replacing any existing library with the same name.
    pub fn insert(&mut self, library: PieceLibrary) -> Option<PieceLibrary> {
        self.libraries.insert(library.name.clone(), library)
    }

    pub fn with_library(mut self, library: PieceLibrary) -> Self {
        self.insert(library);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PieceLibrary> {
        self.libraries.get(name)
    }

    /// Move every library of `other` into this set. Later names win.
    pub fn merge(&mut self, other: LibrarySet) {
        self.libraries.extend(other.libraries);
    }

    /// Library names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.libraries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

impl PieceStore for LibrarySet {
    fn lookup(&self, library: &str, piece: &str) -> PieceLookup<'_> {
        match self.libraries.get(library) {
            None => PieceLookup::NoLibrary,
            Some(lib) => match lib.get(piece) {
                Some(p) => PieceLookup::Found(p),
                None => PieceLookup::NoPiece,
            },
        }
    }
}

impl FromIterator<PieceLibrary> for LibrarySet {
    fn from_iter<I: IntoIterator<Item = PieceLibrary>>(iter: I) -> Self {
        let mut set = LibrarySet::new();
        for library in iter {
            set.insert(library);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> LibrarySet {
        LibrarySet::new().with_library(
            PieceLibrary::new("chars")
                .with_piece("hero", Piece::new("1girl, red hair"))
                .with_piece("mood", Piece::multi("smile\nfrown")),
        )
    }

    #[test]
    fn test_lookup_found() {
        let set = sample_set();
        match set.lookup("chars", "hero") {
            PieceLookup::Found(p) => {
                assert_eq!(p.prompt, "1girl, red hair");
                assert!(!p.multi);
            }
            other => panic!("Expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_missing_library() {
        let set = sample_set();
        assert_eq!(set.lookup("nope", "hero"), PieceLookup::NoLibrary);
    }

    #[test]
    fn test_lookup_missing_piece() {
        let set = sample_set();
        assert_eq!(set.lookup("chars", "villain"), PieceLookup::NoPiece);
    }

    #[test]
    fn test_insert_replaces_same_name() {
        let mut set = sample_set();
        let old = set.insert(PieceLibrary::new("chars"));
        assert!(old.is_some());
        assert_eq!(set.lookup("chars", "hero"), PieceLookup::NoPiece);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_names_sorted() {
        let set: LibrarySet = vec![PieceLibrary::new("zeta"), PieceLibrary::new("alpha")]
            .into_iter()
            .collect();
        assert_eq!(set.names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_piece_yaml_multi_defaults_false() {
        let piece: Piece = serde_yaml::from_str("prompt: a, b").unwrap();
        assert!(!piece.multi);
    }
}
