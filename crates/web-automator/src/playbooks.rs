use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Named markdown guides the model can consult during a run
pub trait PlaybookStore: Send + Sync {
    /// Names of every playbook, sorted
    fn list_names(&self) -> Vec<String>;

    /// The playbook text, or a not-found message listing what is available
    fn read_by_name(&self, name: &str) -> String;
}

/// Playbooks stored as `*.md` files under a directory; nested files are named with `/`
pub struct DirectoryPlaybooks {
    root: PathBuf,
}

impl DirectoryPlaybooks {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn not_found(&self, name: &str) -> String {
        format!(
            "Skill '{}' not found. Available: {:?}",
            name,
            self.list_names()
        )
    }
}

impl PlaybookStore for DirectoryPlaybooks {
    fn list_names(&self) -> Vec<String> {
        if !self.root.is_dir() {
            return Vec::new();
        }

        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let pattern = format!("{}/**/*.md", root.trim_end_matches('/'));
        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(err) => {
                debug!("Invalid playbook pattern {}: {}", pattern, err);
                return Vec::new();
            }
        };

        let mut names: Vec<String> = paths
            .flatten()
            .filter(|path| path.is_file())
            .filter_map(|path| playbook_name(&self.root, &path))
            .collect();
        names.sort();
        names
    }

    fn read_by_name(&self, name: &str) -> String {
        let name = name.trim();
        if name.is_empty() || name.contains("..") || Path::new(name).is_absolute() {
            return self.not_found(name);
        }

        let path = self.root.join(format!("{}.md", name));
        match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                debug!("Could not read playbook {}: {}", path.display(), err);
                self.not_found(name)
            }
        }
    }
}

fn playbook_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
