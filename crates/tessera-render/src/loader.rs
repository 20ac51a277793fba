//! Template loading.
//!
//! `render` and `include` resolve logical names (`app/home.html`) through a
//! [`TemplateLoader`]. Loaders map names to files inside a tenant's template
//! tree and must never read outside it.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tessera_core::LoadError;

/// Source of raw template text
pub trait TemplateLoader: Send + Sync {
    /// Load a template by logical name for the given host
    fn load(&self, name: &str, host: &str) -> Result<String, LoadError>;
}

/// Templates held in memory, shared by every host
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, source: &str) {
        self.templates.insert(name.to_string(), source.to_string());
    }

    pub fn with(mut self, name: &str, source: &str) -> Self {
        self.insert(name, source);
        self
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, name: &str, _host: &str) -> Result<String, LoadError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(name.to_string()))
    }
}

/// Join a relative path onto `root`, rejecting anything that could escape it
///
/// Absolute paths, `..` components and empty names are refused.
pub fn safe_join(root: &Path, relative: &str) -> Result<PathBuf, LoadError> {
    let relative_path = Path::new(relative);
    if relative.trim().is_empty() {
        return Err(LoadError::PathEscape(relative.to_string()));
    }

    let mut joined = root.to_path_buf();
    for component in relative_path.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(LoadError::PathEscape(relative.to_string()));
            }
        }
    }
    Ok(joined)
}

/// Read a file below `root`
pub fn read_below(root: &Path, relative: &str) -> Result<String, LoadError> {
    let path = safe_join(root, relative)?;
    std::fs::read_to_string(&path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound(relative.to_string()),
        _ => LoadError::Io { path, source },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with("app/home.html", "<h1>Home</h1>");
        assert_eq!(loader.load("app/home.html", "any.host").unwrap(), "<h1>Home</h1>");
        assert!(matches!(loader.load("missing.html", ""), Err(LoadError::NotFound(_))));
        assert_eq!(loader.len(), 1);
    }

    #[test]
    fn test_safe_join_rejects_escape() {
        let root = Path::new("/srv/site");
        assert_eq!(safe_join(root, "app/./home.html").unwrap(), PathBuf::from("/srv/site/app/home.html"));
        assert!(matches!(safe_join(root, "../secret"), Err(LoadError::PathEscape(_))));
        assert!(matches!(safe_join(root, "app/../../x"), Err(LoadError::PathEscape(_))));
        assert!(matches!(safe_join(root, "/etc/passwd"), Err(LoadError::PathEscape(_))));
        assert!(matches!(safe_join(root, ""), Err(LoadError::PathEscape(_))));
    }

    #[test]
    fn test_read_below() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/site.css"), "body{}").unwrap();

        assert_eq!(read_below(dir.path(), "assets/site.css").unwrap(), "body{}");
        assert!(matches!(read_below(dir.path(), "assets/none.css"), Err(LoadError::NotFound(_))));
    }
}
