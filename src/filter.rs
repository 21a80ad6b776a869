use crate::model::ClassDescriptor;

/// Decides whether a scanned class is a candidate component.
pub trait CandidateFilter: Send + Sync {
    fn matches(&self, descriptor: &ClassDescriptor) -> bool;
}

impl<F> CandidateFilter for F
where
    F: Fn(&ClassDescriptor) -> bool + Send + Sync,
{
    fn matches(&self, descriptor: &ClassDescriptor) -> bool {
        self(descriptor)
    }
}

/// Matches classes that declare the given annotation type.
///
/// Annotation types themselves are never candidates, even when meta-annotated
/// with the marker.
#[derive(Debug, Clone)]
pub struct AnnotationFilter {
    annotation: String,
}

impl AnnotationFilter {
    pub fn new(annotation: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
        }
    }

    pub fn annotation(&self) -> &str {
        &self.annotation
    }
}

impl CandidateFilter for AnnotationFilter {
    fn matches(&self, descriptor: &ClassDescriptor) -> bool {
        !descriptor.is_annotation() && descriptor.has_annotation(&self.annotation)
    }
}

/// Matches classes whose direct superclass or one of whose directly
/// implemented interfaces is the given type.
#[derive(Debug, Clone)]
pub struct SupertypeFilter {
    supertype: String,
}

impl SupertypeFilter {
    pub fn new(supertype: impl Into<String>) -> Self {
        Self {
            supertype: supertype.into(),
        }
    }
}

impl CandidateFilter for SupertypeFilter {
    fn matches(&self, descriptor: &ClassDescriptor) -> bool {
        descriptor.superclass.as_deref() == Some(self.supertype.as_str())
            || descriptor.interfaces.iter().any(|i| *i == self.supertype)
    }
}

/// Matches concrete classes whose simple name ends with a suffix, e.g.
/// `Handler`.
#[derive(Debug, Clone)]
pub struct NameSuffixFilter {
    suffix: String,
}

impl NameSuffixFilter {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl CandidateFilter for NameSuffixFilter {
    fn matches(&self, descriptor: &ClassDescriptor) -> bool {
        !descriptor.is_interface() && descriptor.simple_name().ends_with(&self.suffix)
    }
}
