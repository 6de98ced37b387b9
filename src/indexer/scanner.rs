// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document scanner using the ignore crate (same as ripgrep)

use ignore::WalkBuilder;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, warn};

use crate::config::IndexConfig;
use crate::errors::Result;
use crate::utils::relative_id;

/// Source document read from the docs directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the docs directory, `/`-separated
    pub doc_id: String,
    pub path: PathBuf,
    pub text: String,
}

impl Document {
    /// File name without extension, used when the text has no heading
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.doc_id.clone())
    }
}

/// Directory scanner for policy documents
pub struct DocumentScanner {
    root: PathBuf,
    extensions: Vec<String>,
    recursive: bool,
}

impl DocumentScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions: vec!["md".into()],
            recursive: false,
        }
    }

    /// Scanner over `root` with the extensions and depth from `[index]`
    pub fn from_config(root: impl AsRef<Path>, config: &IndexConfig) -> Self {
        Self::new(root)
            .with_extensions(config.extensions())
            .recursive(config.recursive())
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when `path` would be picked up as a document
    pub fn matches(&self, path: &Path) -> bool {
        has_extension(path, &self.extensions)
    }

    /// Reads every matching document, sorted by doc id
    pub fn scan(&self) -> Result<Vec<Document>> {
        if !self.root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("docs directory not found: {}", self.root.display()),
            )
            .into());
        }

        let (tx, rx) = mpsc::channel();

        let walker = WalkBuilder::new(&self.root)
            .max_depth(if self.recursive { None } else { Some(1) })
            .git_ignore(true)
            .git_exclude(true)
            .build_parallel();

        let extensions = self.extensions.clone();

        walker.run(|| {
            let tx = tx.clone();
            let root = self.root.clone();
            let extensions = extensions.clone();

            Box::new(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("skipping unreadable entry: {}", e);
                        return ignore::WalkState::Continue;
                    }
                };
                let path = entry.path();
                if path.is_file() && has_extension(path, &extensions) {
                    match std::fs::read_to_string(path) {
                        Ok(text) => {
                            let _ = tx.send(Document {
                                doc_id: relative_id(&root, path),
                                path: path.to_path_buf(),
                                text,
                            });
                        }
                        Err(e) => warn!("skipping {}: {}", path.display(), e),
                    }
                }
                ignore::WalkState::Continue
            })
        });

        drop(tx);
        let mut documents: Vec<Document> = rx.into_iter().collect();
        documents.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        debug!(
            "scanned {} documents under {}",
            documents.len(),
            self.root.display()
        );
        Ok(documents)
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase()))
        .unwrap_or(false)
}
