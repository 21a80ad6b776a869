//! Package scanning: list, filter, resolve and key every candidate class.
//!
//! Packages are scanned in the order given and classes in discovery order.
//! The first class to claim a type key keeps it for the rest of the scan;
//! later claimants are rejected and logged.

use std::collections::HashSet;
use tracing::{debug, error, info};

use crate::error::ScanError;
use crate::filter::{AnnotationFilter, CandidateFilter};
use crate::model::{CandidateMap, CandidateType, ClassDescriptor, TypeKey};
use crate::reader::MetadataReader;
use crate::resolve::{ClasspathResolver, TypeResolver};

/// Element of the marker annotation holding the type key.
pub const KEY_ELEMENT: &str = "value";

#[derive(Debug, Default)]
pub struct ScanReport {
    /// Packages actually scanned, after trimming and de-duplication.
    pub packages: Vec<String>,
    /// Classes decoded across all packages, candidate or not.
    pub classes_seen: usize,
    pub candidates: CandidateMap,
    pub issues: Vec<ScanError>,
}

impl ScanReport {
    pub fn issues_of(&self, kind: &str) -> usize {
        self.issues.iter().filter(|e| e.kind() == kind).count()
    }
}

pub struct PackageScanner {
    reader: MetadataReader,
    filter: Box<dyn CandidateFilter>,
    resolver: Box<dyn TypeResolver>,
    marker: String,
}

impl PackageScanner {
    /// A scanner selecting classes annotated with `marker` and resolving
    /// them against the reader's own class path.
    pub fn new(reader: MetadataReader, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        let resolver = ClasspathResolver::new(reader.lister().clone());
        Self {
            reader,
            filter: Box::new(AnnotationFilter::new(marker.clone())),
            resolver: Box::new(resolver),
            marker,
        }
    }

    pub fn with_filter(mut self, filter: impl CandidateFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn with_resolver(mut self, resolver: impl TypeResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn reader(&self) -> &MetadataReader {
        &self.reader
    }

    /// Candidates under `base_packages`, keyed by type key.
    pub fn scan<I, S>(&self, base_packages: I) -> CandidateMap
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.scan_with_report(base_packages).candidates
    }

    pub fn scan_with_report<I, S>(&self, base_packages: I) -> ScanReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = ScanReport {
            packages: normalize_packages(base_packages),
            ..ScanReport::default()
        };
        let mut seen = HashSet::new();

        for package in report.packages.clone() {
            let listing = self.reader.read_package(&package);
            report.classes_seen += listing.descriptors.len();
            report.issues.extend(listing.issues);

            for descriptor in listing.descriptors {
                if !self.filter.matches(&descriptor) {
                    continue;
                }
                if let Some(candidate) = self.accept(&descriptor, &mut seen, &mut report) {
                    info!(
                        key = %candidate.key,
                        class = %candidate.name,
                        origin = %candidate.origin,
                        "discovered component"
                    );
                    report.candidates.insert(candidate.key, candidate);
                }
            }
        }

        report
    }

    fn accept(
        &self,
        descriptor: &ClassDescriptor,
        seen: &mut HashSet<String>,
        report: &mut ScanReport,
    ) -> Option<CandidateType> {
        // Overlapping packages and shadowed copies later on the class path.
        // Recorded whatever the outcome, so a rejection is reported once.
        if !seen.insert(descriptor.name.clone()) {
            debug!(class = %descriptor.name, origin = %descriptor.origin, "component already discovered");
            return None;
        }

        if let Err(e) = self.resolver.resolve(descriptor) {
            error!(class = %descriptor.name, error = %e, "component type not resolvable");
            report.issues.push(e);
            return None;
        }

        let Some(key) = self.type_key(descriptor) else {
            let e = ScanError::MissingTypeKey {
                class_name: descriptor.name.clone(),
                marker: self.marker.clone(),
            };
            error!(class = %descriptor.name, error = %e, "component without type key");
            report.issues.push(e);
            return None;
        };

        if let Some(existing) = report.candidates.get(&key) {
            let e = ScanError::DuplicateKey {
                key,
                existing: existing.name.clone(),
                rejected: descriptor.name.clone(),
            };
            error!(%key, class = %descriptor.name, existing = %existing.name, "component type key already exists");
            report.issues.push(e);
            return None;
        }

        Some(CandidateType {
            name: descriptor.name.clone(),
            key,
            origin: descriptor.origin.clone(),
        })
    }

    fn type_key(&self, descriptor: &ClassDescriptor) -> Option<TypeKey> {
        descriptor
            .annotation(&self.marker)?
            .element(KEY_ELEMENT)?
            .as_int()
            .map(TypeKey)
    }
}

impl std::fmt::Debug for PackageScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageScanner")
            .field("reader", &self.reader)
            .field("marker", &self.marker)
            .finish_non_exhaustive()
    }
}

/// Trims whitespace and stray dots, drops repeats keeping the first.
pub fn normalize_packages<I, S>(packages: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    packages
        .into_iter()
        .map(|p| p.as_ref().trim().trim_matches('.').to_string())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
