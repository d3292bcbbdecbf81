//! # Thumbnail Model
//!
//! Output dell'elaborazione di un singolo file di input.
//!
//! L'`id` deriva solo da attributi stabili del file (nome, dimensione,
//! modification time): due run sugli stessi file producono gli stessi id.
//! Il `tag` non viene mai assegnato in elaborazione, solo al rendering.

use crate::file_manager::InputFile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A displayable thumbnail for one input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub id: String,
    pub name: String,
    /// Self-contained data URI, empty for placeholders
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Failure description when this is a placeholder for a failed item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Thumbnail {
    /// Id stabile: `<name>_<size>_<last_modified>`
    pub fn id_for(file: &InputFile) -> String {
        format!("{}_{}_{}", file.name, file.size, file.last_modified)
    }

    pub fn new(file: &InputFile, url: String) -> Self {
        Self {
            id: Self::id_for(file),
            name: file.name.clone(),
            url,
            tag: None,
            error: None,
        }
    }

    /// Placeholder per un item il cui resize è fallito
    pub fn placeholder(file: &InputFile, error: impl ToString) -> Self {
        Self {
            id: Self::id_for(file),
            name: file.name.clone(),
            url: String::new(),
            tag: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.error.is_some()
    }

    /// Copia con il tag corrente applicato
    pub fn tagged(&self, tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            ..self.clone()
        }
    }
}

/// Tiene traccia degli id già emessi in un batch.
///
/// Due file con stesso nome, dimensione e timestamp (es. copie in cartelle
/// diverse) ricevono un suffisso `#n` deterministico in ordine di arrivo.
#[derive(Debug, Default)]
pub struct IdRegistry {
    seen: HashMap<String, usize>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, thumbnail: &mut Thumbnail) {
        let count = self.seen.entry(thumbnail.id.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            thumbnail.id = format!("{}#{}", thumbnail.id, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, modified: u64) -> InputFile {
        InputFile::from_bytes(name, modified, vec![1, 2, 3])
    }

    #[test]
    fn test_id_is_stable() {
        let a = Thumbnail::new(&file("a.png", 42), "data:x".into());
        let b = Thumbnail::new(&file("a.png", 42), "data:y".into());
        assert_eq!(a.id, "a.png_3_42");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_placeholder() {
        let thumb = Thumbnail::placeholder(&file("bad.jpg", 1), "corrupt");
        assert!(thumb.is_placeholder());
        assert!(thumb.url.is_empty());
        assert_eq!(thumb.error.as_deref(), Some("corrupt"));
    }

    #[test]
    fn test_registry_suffixes_duplicates() {
        let mut registry = IdRegistry::new();
        let mut first = Thumbnail::new(&file("a.png", 1), String::new());
        let mut second = first.clone();
        let mut third = first.clone();
        let mut other = Thumbnail::new(&file("b.png", 1), String::new());

        registry.claim(&mut first);
        registry.claim(&mut second);
        registry.claim(&mut other);
        registry.claim(&mut third);

        assert_eq!(first.id, "a.png_3_1");
        assert_eq!(second.id, "a.png_3_1#2");
        assert_eq!(third.id, "a.png_3_1#3");
        assert_eq!(other.id, "b.png_3_1");
    }

    #[test]
    fn test_tagged_does_not_touch_original() {
        let thumb = Thumbnail::new(&file("a.png", 1), String::new());
        let tagged = thumb.tagged("city");
        assert_eq!(tagged.tag.as_deref(), Some("city"));
        assert!(thumb.tag.is_none());
    }
}
