use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Persists test files the model generates
pub trait TestSink: Send + Sync {
    /// Write `content` to `filename` and describe what happened
    fn write(&self, filename: &str, content: &str) -> String;
}

/// Writes generated tests into one flat directory
pub struct DirectoryTestSink {
    root: PathBuf,
}

impl DirectoryTestSink {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn try_write(&self, filename: &str, content: &str) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(filename);
        fs::write(&path, content)?;
        path.canonicalize()
    }
}

impl TestSink for DirectoryTestSink {
    fn write(&self, filename: &str, content: &str) -> String {
        let filename = filename.trim();
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            warn!(filename, "refusing generated test filename");
            return format!(
                "Refusing to write test '{}': the filename must be a plain file name",
                filename
            );
        }

        match self.try_write(filename, content) {
            Ok(path) => {
                info!(path = %path.display(), "generated test written");
                format!("Test written to {}", path.display())
            }
            Err(err) => format!("Failed to write test: {}", err),
        }
    }
}
