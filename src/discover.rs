//! Work discovery: enumerate candidate PDFs and subtract checkpointed ones.

use crate::error::BatchError;
use crate::output::{DocumentId, WorkItem};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ── Manifest ─────────────────────────────────────────────────────────────

/// An explicit list of document ids to process.
///
/// One entry per line; the first `|`-delimited field is the id and the
/// remaining columns are ignored. Blank lines are skipped and repeated ids
/// collapse to their first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    ids: Vec<DocumentId>,
}

impl Manifest {
    pub fn parse(text: &str) -> Self {
        let mut seen = HashSet::new();
        let ids = text
            .lines()
            .filter_map(|line| line.split('|').next())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(DocumentId::from)
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Self { ids }
    }

    /// Read a manifest file. A declared manifest that is absent is fatal.
    pub async fn load(path: &Path) -> Result<Self, BatchError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Self::parse(&String::from_utf8_lossy(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BatchError::ManifestNotFound {
                path: path.to_path_buf(),
            }),
            Err(source) => Err(BatchError::ManifestUnreadable {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn ids(&self) -> &[DocumentId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ── Enumeration ──────────────────────────────────────────────────────────

/// A PDF found on disk and the id derived from its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub id: DocumentId,
    pub path: PathBuf,
}

/// Result of walking the source tree.
#[derive(Debug, Default)]
pub struct Enumeration {
    /// Usable sources, sorted by path.
    pub sources: Vec<SourceFile>,
    /// PDFs whose file name yields an id the checkpoint logs cannot hold
    /// (empty, or containing whitespace, control characters or `|`).
    pub rejected: Vec<PathBuf>,
}

/// Walk `root` recursively for `*.pdf` files (extension case-insensitive).
///
/// Directories whose name is in `exclude_dirs` are not entered. Results are
/// sorted by path; when two files map to the same id the first one wins and
/// the rest are logged. Files whose id fails [`DocumentId::validate`] are
/// never dispatched: they could not be read back from the logs and would be
/// redone on every run.
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn enumerate_sources(root: &Path, exclude_dirs: &[String]) -> Result<Enumeration, BatchError> {
    let mut paths = Vec::new();
    let entries = std::fs::read_dir(root).map_err(|source| BatchError::SourceDirUnreadable {
        path: root.to_path_buf(),
        source,
    })?;
    walk(entries, exclude_dirs, &mut paths);
    paths.sort();

    let mut seen: HashMap<DocumentId, PathBuf> = HashMap::new();
    let mut found = Enumeration {
        sources: Vec::with_capacity(paths.len()),
        rejected: Vec::new(),
    };
    for path in paths {
        let Some(id) = DocumentId::from_path(&path) else {
            found.rejected.push(path);
            continue;
        };
        if let Err(e) = id.validate() {
            warn!(path = %path.display(), "Skipping file: {}", e);
            found.rejected.push(path);
            continue;
        }
        if let Some(first) = seen.get(&id) {
            warn!(
                doc = %id,
                kept = %first.display(),
                skipped = %path.display(),
                "Duplicate document id"
            );
            continue;
        }
        seen.insert(id.clone(), path.clone());
        found.sources.push(SourceFile { id, path });
    }
    debug!(
        root = %root.display(),
        count = found.sources.len(),
        rejected = found.rejected.len(),
        "Enumerated source files"
    );
    Ok(found)
}

fn walk(entries: std::fs::ReadDir, exclude_dirs: &[String], out: &mut Vec<PathBuf>) {
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            let name = entry.file_name();
            if exclude_dirs.iter().any(|x| name.to_string_lossy() == x.as_str()) {
                debug!(dir = %path.display(), "Skipping excluded directory");
                continue;
            }
            match std::fs::read_dir(&path) {
                Ok(sub) => walk(sub, exclude_dirs, out),
                Err(e) => warn!(dir = %path.display(), error = %e, "Cannot read directory"),
            }
        } else if is_pdf(&path) {
            out.push(path);
        }
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

// ── Discovery ────────────────────────────────────────────────────────────

/// Outstanding work and what was filtered out.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Items to dispatch, in path order.
    pub items: Vec<WorkItem>,
    /// Candidates skipped because they already have a checkpoint.
    pub already_done: usize,
    /// Manifest ids with no file on disk and no checkpoint, sorted.
    pub missing: Vec<DocumentId>,
    /// Candidates after manifest filtering, before checkpoint filtering.
    pub enumerated: usize,
}

/// Subtract `done` from the enumeration, restricted to `manifest` if given.
pub fn discover(
    sources: Vec<SourceFile>,
    manifest: Option<&Manifest>,
    done: &HashSet<DocumentId>,
) -> Discovery {
    let wanted: Option<HashSet<&DocumentId>> = manifest.map(|m| m.ids().iter().collect());

    let mut on_disk = HashSet::new();
    let mut discovery = Discovery::default();
    for src in sources {
        if let Some(wanted) = &wanted {
            if !wanted.contains(&src.id) {
                continue;
            }
        }
        on_disk.insert(src.id.clone());
        discovery.enumerated += 1;
        if done.contains(&src.id) {
            discovery.already_done += 1;
        } else {
            discovery.items.push(WorkItem::new(src.id, src.path));
        }
    }

    if let Some(m) = manifest {
        discovery.missing = m
            .ids()
            .iter()
            .filter(|id| !on_disk.contains(*id) && !done.contains(*id))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
    }
    discovery
}

/// Overwrite `path` with one id per line (missing report, manifests).
pub async fn write_id_list(path: &Path, ids: &[DocumentId]) -> Result<(), BatchError> {
    let mut text = String::with_capacity(ids.len() * 16);
    for id in ids {
        text.push_str(id.as_str());
        text.push('\n');
    }
    tokio::fs::write(path, text)
        .await
        .map_err(|source| BatchError::ReportWriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, b"%PDF-1.4").unwrap();
    }

    #[test]
    fn manifest_takes_first_pipe_field() {
        let m = Manifest::parse("CN123456789A|ref\n\n CN2B \nCN123456789A|dup\n");
        let ids: Vec<&str> = m.ids().iter().map(DocumentId::as_str).collect();
        assert_eq!(ids, ["CN123456789A", "CN2B"]);
    }

    #[tokio::test]
    async fn missing_manifest_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = Manifest::load(&dir.path().join("pdflist.txt")).await.unwrap_err();
        assert!(matches!(err, BatchError::ManifestNotFound { .. }));
    }

    #[test]
    fn walk_finds_pdfs_and_honours_excludes() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a/CN1A.pdf");
        touch(dir.path(), "b/c/CN2B.PDF");
        touch(dir.path(), "dload/CN3C.pdf");
        touch(dir.path(), "a/notes.txt");

        let sources = enumerate_sources(dir.path(), &["dload".to_string()]).unwrap().sources;
        let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["CN1A", "CN2B"]);
    }

    #[test]
    fn duplicate_ids_keep_first_path() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a/CN1A.pdf");
        touch(dir.path(), "b/CN1A.pdf");
        let sources = enumerate_sources(dir.path(), &[]).unwrap().sources;
        assert_eq!(sources.len(), 1);
        assert!(sources[0].path.ends_with("a/CN1A.pdf"));
    }

    #[test]
    fn unloggable_file_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "CN1|A.pdf");
        touch(dir.path(), " CN2B.pdf");
        touch(dir.path(), "CN3C .pdf");
        touch(dir.path(), "CN4D.pdf");

        let found = enumerate_sources(dir.path(), &[]).unwrap();
        let ids: Vec<&str> = found.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["CN4D"]);
        assert_eq!(found.rejected.len(), 3);
    }

    #[test]
    fn unreadable_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = enumerate_sources(&dir.path().join("absent"), &[]).unwrap_err();
        assert!(matches!(err, BatchError::SourceDirUnreadable { .. }));
    }

    #[test]
    fn discover_subtracts_done_and_reports_missing() {
        let sources = vec![
            SourceFile { id: "CN1A".into(), path: "x/CN1A.pdf".into() },
            SourceFile { id: "CN2B".into(), path: "x/CN2B.pdf".into() },
            SourceFile { id: "CN3C".into(), path: "x/CN3C.pdf".into() },
        ];
        let manifest = Manifest::parse("CN2B\nCN1A\nCN123456789A|ref\nCN9Z\n");
        let done: HashSet<DocumentId> = ["CN1A".into(), "CN9Z".into()].into_iter().collect();

        let d = discover(sources, Some(&manifest), &done);
        let items: Vec<&str> = d.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(items, ["CN2B"]);
        assert_eq!(d.enumerated, 2);
        assert_eq!(d.already_done, 1);
        assert_eq!(d.missing, vec![DocumentId::new("CN123456789A")]);
    }

    #[test]
    fn discover_without_manifest_takes_everything_outstanding() {
        let sources = vec![
            SourceFile { id: "CN1A".into(), path: "CN1A.pdf".into() },
            SourceFile { id: "CN2B".into(), path: "CN2B.pdf".into() },
        ];
        let done: HashSet<DocumentId> = ["CN2B".into()].into_iter().collect();
        let d = discover(sources, None, &done);
        assert_eq!(d.items.len(), 1);
        assert!(d.missing.is_empty());
    }
}
