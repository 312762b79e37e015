use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};
use walkdir::WalkDir;

use persona_core::types::EmbeddingIndex;
use persona_core::{RawCorpus, SourceKind};

/// Read the seven named corpus files from `dir`. A missing file is an empty
/// source; any other read error is fatal.
pub fn load_corpus(dir: &Path) -> Result<RawCorpus> {
    if !dir.is_dir() {
        anyhow::bail!("corpus directory {} does not exist", dir.display());
    }
    let mut corpus = RawCorpus::default();
    for kind in SourceKind::ALL {
        let path = dir.join(kind.file_name());
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(source = %kind, bytes = text.len(), "loaded corpus file");
                corpus.set(kind, text);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => debug!(source = %kind, "corpus file missing, treating as empty"),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
    Ok(corpus)
}

pub fn read_index(path: &Path) -> Result<EmbeddingIndex> {
    let json = fs::read_to_string(path).with_context(|| format!("reading index {}", path.display()))?;
    EmbeddingIndex::from_json(&json).with_context(|| format!("parsing index {}", path.display()))
}

pub fn write_index(path: &Path, index: &EmbeddingIndex) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, index.to_json()?).with_context(|| format!("writing index {}", path.display()))?;
    info!(path = %path.display(), entries = index.entries.len(), "wrote embedding index");
    Ok(())
}

/// Every `.txt` file under `dir`, sorted by path, with its contents.
pub fn collect_outputs(dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut outputs = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "txt") {
            let text = fs::read_to_string(entry.path()).with_context(|| format!("reading {}", entry.path().display()))?;
            outputs.push((entry.into_path(), text));
        }
    }
    Ok(outputs)
}
