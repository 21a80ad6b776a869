use std::sync::Arc;

use crate::classpath::ResourceLister;
use crate::error::ScanError;
use crate::model::{ClassDescriptor, class_name_to_class_path};

/// Packages provided by the runtime rather than the class path.
pub const DEFAULT_PLATFORM_PREFIXES: &[&str] = &["java.", "javax.", "jdk.", "sun."];

/// Confirms that a matched class can be resolved to a loadable type.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, descriptor: &ClassDescriptor) -> Result<(), ScanError>;
}

/// Resolves against a class path the way a class loader would link: the
/// class must be visible, and so must its direct superclass and interfaces
/// unless the platform provides them.
#[derive(Clone)]
pub struct ClasspathResolver {
    lister: Arc<dyn ResourceLister>,
    platform_prefixes: Vec<String>,
}

impl ClasspathResolver {
    pub fn new(lister: Arc<dyn ResourceLister>) -> Self {
        Self {
            lister,
            platform_prefixes: DEFAULT_PLATFORM_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    pub fn with_platform_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platform_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    fn is_platform(&self, class_name: &str) -> bool {
        self.platform_prefixes
            .iter()
            .any(|p| class_name.starts_with(p.as_str()))
    }

    fn is_visible(&self, class_name: &str) -> bool {
        self.is_platform(class_name) || self.lister.contains(&class_name_to_class_path(class_name))
    }
}

impl TypeResolver for ClasspathResolver {
    fn resolve(&self, descriptor: &ClassDescriptor) -> Result<(), ScanError> {
        let failure = |reason: String| ScanError::TypeResolution {
            class_name: descriptor.name.clone(),
            reason,
        };

        if !self.is_visible(&descriptor.name) {
            return Err(failure("class not found on the class path".to_string()));
        }

        let supertypes = descriptor
            .superclass
            .iter()
            .chain(descriptor.interfaces.iter());
        for supertype in supertypes {
            if !self.is_visible(supertype) {
                return Err(failure(format!("missing supertype {supertype}")));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClasspathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClasspathResolver")
            .field("lister", &self.lister.location())
            .field("platform_prefixes", &self.platform_prefixes)
            .finish()
    }
}

/// Accepts every descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl TypeResolver for AcceptAll {
    fn resolve(&self, _descriptor: &ClassDescriptor) -> Result<(), ScanError> {
        Ok(())
    }
}
