//! Library Loader - Load and cache piece libraries from YAML files
//!
//! A library file looks like:
//!
//! ```yaml
//! name: chars          # optional, defaults to the file stem
//! pieces:
//!   hero: 1girl, red hair
//!   mood:
//!     multi: true
//!     prompt: |
//!       smile, blush
//!       frown
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Deserialize;

use crate::error::{LoomError, Result};

use super::library::{LibrarySet, Piece, PieceLibrary};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PieceEntry {
    Text(String),
    Full(Piece),
}

#[derive(Debug, Deserialize)]
struct LibraryFile {
    name: Option<String>,
    #[serde(default)]
    pieces: BTreeMap<String, PieceEntry>,
}

/// Parse one library document. `fallback_name` is used when the document has no `name`.
pub fn parse_library(content: &str, fallback_name: &str) -> Result<PieceLibrary> {
    let file: LibraryFile = serde_yaml::from_str(content)?;
    let mut library = PieceLibrary::new(file.name.unwrap_or_else(|| fallback_name.to_string()));
    for (name, entry) in file.pieces {
        let piece = match entry {
            PieceEntry::Text(prompt) => Piece::new(prompt),
            PieceEntry::Full(piece) => piece,
        };
        library.insert(name, piece);
    }
    Ok(library)
}

/// Read and parse a single library file.
pub fn load_library_file(path: &Path) -> Result<PieceLibrary> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        LoomError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to load library from {:?}: {}", path, e),
        ))
    })?;
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    parse_library(&content, stem)
        .map_err(|e| LoomError::Library(format!("{}: {}", path.display(), e)))
}

/// Load every library file matching a glob pattern into `set`.
///
/// Returns the number of libraries loaded.
pub fn load_glob(pattern: &str, set: &mut LibrarySet) -> Result<usize> {
    let paths = glob::glob(pattern).map_err(|e| LoomError::Library(format!("Bad pattern '{}': {}", pattern, e)))?;
    let mut loaded = 0;
    for entry in paths {
        let path = entry.map_err(|e| LoomError::Library(e.to_string()))?;
        let library = load_library_file(&path)?;
        tracing::debug!(library = %library.name, path = %path.display(), "Loaded piece library");
        set.insert(library);
        loaded += 1;
    }
    Ok(loaded)
}

fn is_library_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "yml" || ext == "yaml")
}

/// Loads and caches piece libraries from a directory
pub struct LibraryLoader {
    /// Directory containing `*.yml` / `*.yaml` library files
    libraries_dir: PathBuf,
    /// In-memory cache of parsed libraries keyed by file stem
    cache: RwLock<HashMap<String, PieceLibrary>>,
}

impl LibraryLoader {
    /// Create a new LibraryLoader for the given directory
    pub fn new(libraries_dir: impl AsRef<Path>) -> Self {
        Self {
            libraries_dir: libraries_dir.as_ref().to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load a library by file stem, caching the parsed result
    pub fn load(&self, stem: &str) -> Result<PieceLibrary> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|e| LoomError::Library(format!("Failed to acquire read lock: {}", e)))?;
            if let Some(library) = cache.get(stem) {
                return Ok(library.clone());
            }
        }

        let path = self
            .library_path(stem)
            .ok_or_else(|| LoomError::Library(format!("No library file for '{}' in {:?}", stem, self.libraries_dir)))?;
        let library = load_library_file(&path)?;

        {
            let mut cache = self
                .cache
                .write()
                .map_err(|e| LoomError::Library(format!("Failed to acquire write lock: {}", e)))?;
            cache.insert(stem.to_string(), library.clone());
        }

        Ok(library)
    }

    /// Get a cached library without touching the disk
    pub fn get(&self, stem: &str) -> Option<PieceLibrary> {
        let cache = self.cache.read().ok()?;
        cache.get(stem).cloned()
    }

    /// Check if a library file exists on disk
    pub fn exists(&self, stem: &str) -> bool {
        self.library_path(stem).is_some()
    }

    fn library_path(&self, stem: &str) -> Option<PathBuf> {
        ["yml", "yaml"]
            .iter()
            .map(|ext| self.libraries_dir.join(format!("{}.{}", stem, ext)))
            .find(|p| p.exists())
    }

    /// List the stems of all library files in the directory
    pub fn list_available(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.libraries_dir).map_err(|e| {
            LoomError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read libraries directory {:?}: {}", self.libraries_dir, e),
            ))
        })?;

        let mut stems = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if is_library_file(&path)
                && let Some(stem) = path.file_stem()
                && let Some(name) = stem.to_str()
            {
                stems.push(name.to_string());
            }
        }

        stems.sort();
        stems.dedup();
        Ok(stems)
    }

    /// Load every library in the directory into a fresh set
    pub fn load_all(&self) -> Result<LibrarySet> {
        let mut set = LibrarySet::new();
        for stem in self.list_available()? {
            set.insert(self.load(&stem)?);
        }
        Ok(set)
    }

    /// Clear the library cache
    pub fn clear_cache(&self) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|e| LoomError::Library(format!("Failed to acquire write lock: {}", e)))?;
        cache.clear();
        Ok(())
    }

    /// Get the libraries directory path
    pub fn libraries_dir(&self) -> &Path {
        &self.libraries_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::library::{PieceLookup, PieceStore};
    use std::fs;
    use tempfile::TempDir;

    fn create_test_loader() -> (LibraryLoader, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let loader = LibraryLoader::new(temp_dir.path());
        (loader, temp_dir)
    }

    fn write_library(temp_dir: &TempDir, file: &str, content: &str) {
        fs::write(temp_dir.path().join(file), content).unwrap();
    }

    const CHARS: &str = "name: chars\npieces:\n  hero: 1girl, red hair\n  mood:\n    multi: true\n    prompt: |\n      smile\n      frown\n";

    #[test]
    fn test_parse_library_shorthand_and_full() {
        let library = parse_library(CHARS, "ignored").unwrap();
        assert_eq!(library.name, "chars");
        assert_eq!(library.get("hero"), Some(&Piece::new("1girl, red hair")));
        let mood = library.get("mood").unwrap();
        assert!(mood.multi);
        assert_eq!(mood.prompt, "smile\nfrown\n");
    }

    #[test]
    fn test_parse_library_fallback_name() {
        let library = parse_library("pieces:\n  a: b\n", "styles").unwrap();
        assert_eq!(library.name, "styles");
    }

    #[test]
    fn test_parse_library_invalid_yaml() {
        assert!(parse_library("pieces: [unclosed", "x").is_err());
    }

    #[test]
    fn test_load_caches_library() {
        let (loader, temp_dir) = create_test_loader();
        write_library(&temp_dir, "chars.yml", CHARS);

        let first = loader.load("chars").unwrap();
        write_library(&temp_dir, "chars.yml", "name: chars\npieces: {}\n");
        let second = loader.load("chars").unwrap();

        assert_eq!(first, second);
        assert!(loader.get("chars").is_some());
    }

    #[test]
    fn test_load_yaml_extension() {
        let (loader, temp_dir) = create_test_loader();
        write_library(&temp_dir, "alt.yaml", "pieces:\n  p: q\n");
        assert!(loader.exists("alt"));
        assert_eq!(loader.load("alt").unwrap().name, "alt");
    }

    #[test]
    fn test_load_nonexistent() {
        let (loader, _temp_dir) = create_test_loader();
        assert!(loader.load("nonexistent").is_err());
        assert!(!loader.exists("nonexistent"));
    }

    #[test]
    fn test_list_available_ignores_other_files() {
        let (loader, temp_dir) = create_test_loader();
        write_library(&temp_dir, "b.yml", "pieces: {}\n");
        write_library(&temp_dir, "a.yaml", "pieces: {}\n");
        write_library(&temp_dir, "notes.txt", "not a library");

        assert_eq!(loader.list_available().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_load_all_builds_store() {
        let (loader, temp_dir) = create_test_loader();
        write_library(&temp_dir, "chars.yml", CHARS);
        write_library(&temp_dir, "style.yml", "pieces:\n  dress: white dress\n");

        let set = loader.load_all().unwrap();
        assert_eq!(set.names(), vec!["chars", "style"]);
        assert!(matches!(set.lookup("style", "dress"), PieceLookup::Found(_)));
    }

    #[test]
    fn test_clear_cache() {
        let (loader, temp_dir) = create_test_loader();
        write_library(&temp_dir, "chars.yml", CHARS);
        loader.load("chars").unwrap();
        loader.clear_cache().unwrap();
        assert!(loader.get("chars").is_none());
    }

    #[test]
    fn test_load_glob() {
        let temp_dir = TempDir::new().unwrap();
        write_library(&temp_dir, "chars.yml", CHARS);
        write_library(&temp_dir, "style.yml", "pieces:\n  dress: white dress\n");

        let pattern = format!("{}/*.yml", temp_dir.path().display());
        let mut set = LibrarySet::new();
        assert_eq!(load_glob(&pattern, &mut set).unwrap(), 2);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_load_library_file_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        write_library(&temp_dir, "bad.yml", "pieces: [");
        let err = load_library_file(&temp_dir.path().join("bad.yml")).unwrap_err();
        assert!(err.to_string().contains("bad.yml"));
    }
}
