use rayon::prelude::*;
use std::sync::Arc;
use tracing::{error, warn};

use crate::classfile::{ClassFileDecoder, MetadataDecoder};
use crate::classpath::ResourceLister;
use crate::error::ScanError;
use crate::model::{ClassDescriptor, class_name_to_class_path};

/// What one package yielded: the decoded classes in discovery order and the
/// problems met on the way.
#[derive(Debug, Default)]
pub struct PackageListing {
    pub descriptors: Vec<ClassDescriptor>,
    pub issues: Vec<ScanError>,
}

/// Lists the classes of a package as [`ClassDescriptor`]s, pairing a
/// [`ResourceLister`] with a [`MetadataDecoder`].
#[derive(Clone)]
pub struct MetadataReader {
    lister: Arc<dyn ResourceLister>,
    decoder: Arc<dyn MetadataDecoder>,
}

impl MetadataReader {
    pub fn new(lister: Arc<dyn ResourceLister>) -> Self {
        Self {
            lister,
            decoder: Arc::new(ClassFileDecoder::new()),
        }
    }

    pub fn with_decoder(mut self, decoder: impl MetadataDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    pub fn lister(&self) -> &Arc<dyn ResourceLister> {
        &self.lister
    }

    /// Every class under `package`, recursively.
    ///
    /// Errors with [`ScanError::ScanIo`] only when nothing could be listed at
    /// all; classes that fail to decode are logged and left out.
    pub fn list_classes(&self, package: &str) -> Result<Vec<ClassDescriptor>, ScanError> {
        let mut listing = self.read_package(package);
        if listing.descriptors.is_empty()
            && let Some(pos) = listing
                .issues
                .iter()
                .position(|e| matches!(e, ScanError::ScanIo { .. }))
        {
            return Err(listing.issues.swap_remove(pos));
        }
        Ok(listing.descriptors)
    }

    /// One class by binary name, read straight from its resource.
    pub fn read_class(&self, class_name: &str) -> Result<Option<ClassDescriptor>, ScanError> {
        let Some(resource) = self.lister.read(&class_name_to_class_path(class_name))? else {
            return Ok(None);
        };
        self.decoder
            .decode(&resource.bytes, resource.origin.clone())
            .map(Some)
            .map_err(|source| ScanError::Metadata {
                resource: resource.origin.to_string(),
                source,
            })
    }

    pub fn read_package(&self, package: &str) -> PackageListing {
        let (resources, mut issues) = self.lister.list_partial(package);
        for e in issues.iter() {
            error!(package, error = %e, "failed to list class resources");
        }

        let decoded: Vec<Result<ClassDescriptor, ScanError>> = resources
            .into_par_iter()
            .map(|r| {
                self.decoder
                    .decode(&r.bytes, r.origin.clone())
                    .map_err(|source| ScanError::Metadata {
                        resource: r.origin.to_string(),
                        source,
                    })
            })
            .collect();

        let mut descriptors = Vec::with_capacity(decoded.len());
        for result in decoded {
            match result {
                Ok(d) => descriptors.push(d),
                Err(e) => {
                    warn!(package, error = %e, "skipping unreadable class resource");
                    issues.push(e);
                }
            }
        }

        PackageListing {
            descriptors,
            issues,
        }
    }
}

impl std::fmt::Debug for MetadataReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataReader")
            .field("lister", &self.lister.location())
            .finish_non_exhaustive()
    }
}
