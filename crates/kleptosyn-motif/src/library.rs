//! The motif catalog.
//!
//! Read-only after load. Lookup is by name; iteration follows catalog order
//! (built-ins first, then user templates in the order they were added).

use crate::builtin::builtin_templates;
use crate::template::MotifTemplate;
use crate::validate::{validate, MotifDefinitionError, ValidatedTemplate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error(transparent)]
    Definition(#[from] MotifDefinitionError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse template {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("template `{0}` is already in the library")]
    Duplicate(String),
}

#[derive(Debug, Clone, Default)]
pub struct MotifLibrary {
    templates: Vec<ValidatedTemplate>,
    by_name: HashMap<String, usize>,
}

impl MotifLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A library holding the built-in catalog.
    pub fn builtin() -> Result<Self, LibraryError> {
        let mut lib = Self::new();
        for t in builtin_templates() {
            lib.insert(t)?;
        }
        Ok(lib)
    }

    /// Validate and add a template; names must be unique.
    pub fn insert(&mut self, template: MotifTemplate) -> Result<&ValidatedTemplate, LibraryError> {
        if self.by_name.contains_key(&template.name) {
            return Err(LibraryError::Duplicate(template.name));
        }
        let validated = validate(template)?;
        let idx = self.templates.len();
        self.by_name.insert(validated.name().to_string(), idx);
        self.templates.push(validated);
        Ok(&self.templates[idx])
    }

    /// Validate and add a template, shadowing an existing one of the same
    /// name in place (so catalog order is kept).
    pub fn replace(&mut self, template: MotifTemplate) -> Result<&ValidatedTemplate, LibraryError> {
        let validated = validate(template)?;
        let idx = match self.by_name.get(validated.name()) {
            Some(&idx) => {
                tracing::debug!(template = validated.name(), "user template shadows existing one");
                self.templates[idx] = validated;
                idx
            }
            None => {
                let idx = self.templates.len();
                self.by_name.insert(validated.name().to_string(), idx);
                self.templates.push(validated);
                idx
            }
        };
        Ok(&self.templates[idx])
    }

    /// Load one JSON template file.
    pub fn load_file(&mut self, path: &Path) -> Result<&ValidatedTemplate, LibraryError> {
        let text = std::fs::read_to_string(path).map_err(|source| LibraryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let template = MotifTemplate::from_json_str(&text).map_err(|source| LibraryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        self.replace(template)
    }

    /// Load every `*.json` file under `dir` (recursively, sorted by path).
    /// Returns the names that were loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<Vec<String>, LibraryError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|err| LibraryError::Io {
                path: dir.to_path_buf(),
                source: err.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(entry.into_path());
            }
        }
        files.sort();

        let mut loaded = Vec::with_capacity(files.len());
        for path in files {
            let name = self.load_file(&path)?.name().to_string();
            tracing::debug!(path = %path.display(), template = %name, "loaded motif template");
            loaded.push(name);
        }
        Ok(loaded)
    }

    pub fn get(&self, name: &str) -> Option<&ValidatedTemplate> {
        self.by_name.get(name).map(|&i| &self.templates[i])
    }

    /// Catalog position of a template.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatedTemplate> + '_ {
        self.templates.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.templates.iter().map(ValidatedTemplate::name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{fan_out_burst, BUILTIN_NAMES};
    use crate::template::MotifShape;

    #[test]
    fn builtin_catalog_order() {
        let lib = MotifLibrary::builtin().unwrap();
        assert_eq!(lib.names().collect::<Vec<_>>(), BUILTIN_NAMES);
        assert_eq!(lib.position("mule_burst"), Some(2));
        assert!(lib.get("nope").is_none());
    }

    #[test]
    fn insert_rejects_duplicates_but_replace_shadows() {
        let mut lib = MotifLibrary::builtin().unwrap();
        let err = lib.insert(fan_out_burst()).unwrap_err();
        assert!(matches!(err, LibraryError::Duplicate(name) if name == "fan_out_burst"));

        let mut custom = fan_out_burst();
        custom.shape = MotifShape::Burst { window_hours: 4.0 };
        lib.replace(custom).unwrap();
        assert_eq!(lib.len(), BUILTIN_NAMES.len());
        assert_eq!(lib.position("fan_out_burst"), Some(3));
        assert_eq!(lib.get("fan_out_burst").unwrap().shape().window_hours(), Some(4.0));
    }
}
