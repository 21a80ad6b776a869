//! Class path entries and class resource listing.
//!
//! A class path is an ordered list of entries, each a directory tree or a
//! `.jar`/`.zip` archive. Listing a package returns every `*.class` resource
//! under the package path, recursively, in class path order.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use memmap2::Mmap;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::ScanError;
use crate::model::{ResourceOrigin, package_to_path_prefix};

/// The raw bytes of one class resource and where they came from.
#[derive(Debug, Clone)]
pub struct ClassResource {
    pub origin: ResourceOrigin,
    pub bytes: Vec<u8>,
}

/// Enumerates class resources without loading them.
pub trait ResourceLister: Send + Sync {
    /// Every `*.class` resource under `package` (dotted, empty for the root).
    fn list(&self, package: &str) -> Result<Vec<ClassResource>, ScanError>;

    /// Like [`list`](Self::list), but keeps whatever could be listed when
    /// only part of the lister failed.
    fn list_partial(&self, package: &str) -> (Vec<ClassResource>, Vec<ScanError>) {
        match self.list(package) {
            Ok(found) => (found, Vec::new()),
            Err(e) => (Vec::new(), vec![e]),
        }
    }

    /// The single slash separated `resource`, or `None` when absent.
    fn read(&self, resource: &str) -> Result<Option<ClassResource>, ScanError> {
        Ok(self
            .list(&package_of_resource(resource))?
            .into_iter()
            .find(|r| r.origin.resource == resource))
    }

    /// Whether the slash separated `resource` path exists.
    fn contains(&self, resource: &str) -> bool;

    /// Used for origins and log lines.
    fn location(&self) -> &Path;
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    root: PathBuf,
}

impl DirectoryEntry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceLister for DirectoryEntry {
    fn list(&self, package: &str) -> Result<Vec<ClassResource>, ScanError> {
        let (resources, mut failures) = self.list_partial(package);
        if failures.is_empty() {
            Ok(resources)
        } else {
            Err(failures.swap_remove(0))
        }
    }

    /// Unreadable files and subdirectories are reported one by one; the
    /// rest of the tree is still listed.
    fn list_partial(&self, package: &str) -> (Vec<ClassResource>, Vec<ScanError>) {
        let prefix = package_to_path_prefix(package);
        let base = self.root.join(&prefix);
        let mut resources = Vec::new();
        let mut failures = Vec::new();
        if !base.is_dir() {
            return (resources, failures);
        }

        let walker = WalkBuilder::new(&base)
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(entry = %self.root.display(), package, error = %e, "skipping unreadable path");
                    failures.push(self.io_error(package, e));
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file())
                || path.extension().is_none_or(|e| e != "class")
            {
                continue;
            }

            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let resource = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            match std::fs::read(path) {
                Ok(bytes) => resources.push(ClassResource {
                    origin: ResourceOrigin {
                        entry: self.root.clone(),
                        resource,
                    },
                    bytes,
                }),
                Err(e) => {
                    warn!(entry = %self.root.display(), resource = %resource, error = %e, "skipping unreadable class file");
                    failures.push(self.io_error(package, format!("{resource}: {e}")));
                }
            }
        }
        (resources, failures)
    }

    fn read(&self, resource: &str) -> Result<Option<ClassResource>, ScanError> {
        let path = self.root.join(resource);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .map_err(|e| self.io_error(&package_of_resource(resource), format!("{resource}: {e}")))?;
        Ok(Some(ClassResource {
            origin: ResourceOrigin {
                entry: self.root.clone(),
                resource: resource.to_string(),
            },
            bytes,
        }))
    }

    fn contains(&self, resource: &str) -> bool {
        self.root.join(resource).is_file()
    }

    fn location(&self) -> &Path {
        &self.root
    }
}

impl DirectoryEntry {
    fn io_error(&self, package: &str, e: impl std::fmt::Display) -> ScanError {
        ScanError::ScanIo {
            package: package.to_string(),
            entry: self.root.clone(),
            reason: e.to_string(),
        }
    }
}

/// A `.jar` or `.zip` archive, read through a memory map.
#[derive(Debug)]
pub struct ArchiveEntry {
    path: PathBuf,
    names: OnceLock<HashSet<String>>,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            names: OnceLock::new(),
        }
    }

    fn with_archive<T>(
        &self,
        f: impl FnOnce(&mut ZipArchive<Cursor<&[u8]>>) -> Result<T>,
    ) -> Result<T> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open archive: {}", self.path.display()))?;
        // SAFETY: The file is opened read-only and outlives the mapping, which
        // is dropped at the end of this function.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to mmap archive: {}", self.path.display()))?;
        let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
            .with_context(|| format!("Failed to read zip structure: {}", self.path.display()))?;
        f(&mut archive)
    }

    fn entry_names(&self) -> &HashSet<String> {
        self.names.get_or_init(|| {
            self.with_archive(|archive| Ok(archive.file_names().map(str::to_string).collect()))
                .unwrap_or_else(|e| {
                    warn!(archive = %self.path.display(), error = %e, "archive unreadable");
                    HashSet::new()
                })
        })
    }
}

impl ResourceLister for ArchiveEntry {
    fn list(&self, package: &str) -> Result<Vec<ClassResource>, ScanError> {
        let (resources, mut failures) = self.list_partial(package);
        if failures.is_empty() {
            Ok(resources)
        } else {
            Err(failures.swap_remove(0))
        }
    }

    /// An unreadable archive fails as a whole. A member that fails to
    /// inflate is reported on its own and the other members still count.
    fn list_partial(&self, package: &str) -> (Vec<ClassResource>, Vec<ScanError>) {
        let prefix = package_to_path_prefix(package);
        let listed = self.with_archive(|archive| {
            let mut resources = Vec::new();
            let mut failures = Vec::new();
            for i in 0..archive.len() {
                let mut entry = match archive.by_index(i) {
                    Ok(entry) => entry,
                    Err(e) => {
                        failures.push(self.io_error(package, format!("entry #{i}: {e}")));
                        continue;
                    }
                };
                if entry.is_dir() {
                    continue;
                }
                let name = entry.name().to_string();
                if !name.ends_with(".class") || !name.starts_with(&prefix) {
                    continue;
                }
                // The header's size is not trusted as an allocation hint.
                let mut bytes = Vec::new();
                if let Err(e) = entry.read_to_end(&mut bytes) {
                    warn!(archive = %self.path.display(), resource = %name, error = %e, "skipping class that failed to inflate");
                    failures.push(self.io_error(package, format!("Failed to inflate {name}: {e}")));
                    continue;
                }
                resources.push(ClassResource {
                    origin: ResourceOrigin {
                        entry: self.path.clone(),
                        resource: name,
                    },
                    bytes,
                });
            }
            Ok((resources, failures))
        });

        listed.unwrap_or_else(|e| (Vec::new(), vec![self.io_error(package, format!("{e:#}"))]))
    }

    fn read(&self, resource: &str) -> Result<Option<ClassResource>, ScanError> {
        if !self.contains(resource) {
            return Ok(None);
        }
        self.with_archive(|archive| {
            let mut entry = archive.by_name(resource)?;
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .with_context(|| format!("Failed to inflate {resource}"))?;
            Ok(Some(ClassResource {
                origin: ResourceOrigin {
                    entry: self.path.clone(),
                    resource: resource.to_string(),
                },
                bytes,
            }))
        })
        .map_err(|e| self.io_error(&package_of_resource(resource), format!("{e:#}")))
    }

    fn contains(&self, resource: &str) -> bool {
        self.entry_names().contains(resource)
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

impl ArchiveEntry {
    fn io_error(&self, package: &str, e: impl std::fmt::Display) -> ScanError {
        ScanError::ScanIo {
            package: package.to_string(),
            entry: self.path.clone(),
            reason: e.to_string(),
        }
    }
}

/// In-memory entry, keyed by slash separated resource path.
#[derive(Debug, Clone, Default)]
pub struct MemoryEntry {
    name: PathBuf,
    resources: BTreeMap<String, Vec<u8>>,
}

impl MemoryEntry {
    pub fn new(name: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            resources: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, resource: impl Into<String>, bytes: Vec<u8>) -> &mut Self {
        self.resources.insert(resource.into(), bytes);
        self
    }
}

impl ResourceLister for MemoryEntry {
    fn list(&self, package: &str) -> Result<Vec<ClassResource>, ScanError> {
        let prefix = package_to_path_prefix(package);
        Ok(self
            .resources
            .range(prefix.clone()..)
            .take_while(|(name, _)| name.starts_with(&prefix))
            .filter(|(name, _)| name.ends_with(".class"))
            .map(|(name, bytes)| ClassResource {
                origin: ResourceOrigin {
                    entry: self.name.clone(),
                    resource: name.clone(),
                },
                bytes: bytes.clone(),
            })
            .collect())
    }

    fn read(&self, resource: &str) -> Result<Option<ClassResource>, ScanError> {
        Ok(self.resources.get(resource).map(|bytes| ClassResource {
            origin: ResourceOrigin {
                entry: self.name.clone(),
                resource: resource.to_string(),
            },
            bytes: bytes.clone(),
        }))
    }

    fn contains(&self, resource: &str) -> bool {
        self.resources.contains_key(resource)
    }

    fn location(&self) -> &Path {
        &self.name
    }
}

/// An ordered class path. Earlier entries shadow later ones for lookups and
/// come first in listings.
pub struct Classpath {
    entries: Vec<Box<dyn ResourceLister>>,
    label: PathBuf,
}

impl std::fmt::Debug for Classpath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.location().display().to_string()))
            .finish()
    }
}

impl Default for Classpath {
    fn default() -> Self {
        Self::new()
    }
}

impl Classpath {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            label: PathBuf::from("<classpath>"),
        }
    }

    /// Builds a class path from filesystem paths. Directories become
    /// directory entries, `.jar`/`.zip` files archive entries; anything else
    /// is skipped with a warning.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut classpath = Self::new();
        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                classpath.push(DirectoryEntry::new(path));
            } else if is_archive(path) && path.is_file() {
                classpath.push(ArchiveEntry::new(path));
            } else {
                warn!(entry = %path.display(), "skipping class path entry that is neither a directory nor an archive");
            }
        }
        classpath
    }

    pub fn push(&mut self, entry: impl ResourceLister + 'static) -> &mut Self {
        self.entries.push(Box::new(entry));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn list_all(&self, package: &str) -> (Vec<ClassResource>, Vec<ScanError>) {
        let mut resources = Vec::new();
        let mut failures = Vec::new();
        for entry in self.entries.iter() {
            let (mut found, mut failed) = entry.list_partial(package);
            debug!(
                entry = %entry.location().display(),
                package,
                count = found.len(),
                failures = failed.len(),
                "listed class resources"
            );
            resources.append(&mut found);
            failures.append(&mut failed);
        }
        (resources, failures)
    }
}

impl ResourceLister for Classpath {
    /// Fails only when nothing could be listed. Partial failures are dropped
    /// here; [`ResourceLister::list_partial`] keeps them.
    fn list(&self, package: &str) -> Result<Vec<ClassResource>, ScanError> {
        let (resources, mut failures) = self.list_all(package);
        if resources.is_empty() && !failures.is_empty() {
            return Err(failures.swap_remove(0));
        }
        Ok(resources)
    }

    fn list_partial(&self, package: &str) -> (Vec<ClassResource>, Vec<ScanError>) {
        self.list_all(package)
    }

    /// The first entry holding `resource` wins, as with a class loader.
    fn read(&self, resource: &str) -> Result<Option<ClassResource>, ScanError> {
        let mut failure = None;
        for entry in self.entries.iter() {
            match entry.read(resource) {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                Err(e) => {
                    warn!(entry = %entry.location().display(), resource, error = %e, "failed to read class resource");
                    failure.get_or_insert(e);
                }
            }
        }
        failure.map_or(Ok(None), Err)
    }

    fn contains(&self, resource: &str) -> bool {
        self.entries.iter().any(|e| e.contains(resource))
    }

    fn location(&self) -> &Path {
        &self.label
    }
}

fn package_of_resource(resource: &str) -> String {
    resource
        .rsplit_once('/')
        .map_or("", |(dir, _)| dir)
        .replace('/', ".")
}

pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("jar") || e.eq_ignore_ascii_case("zip"))
}

/// Splits a `CLASSPATH` style string on the platform separator.
pub fn split_classpath(raw: &str) -> Vec<PathBuf> {
    std::env::split_paths(raw)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}
