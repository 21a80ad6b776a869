//! Startup registration: configuration in, populated registry out.

use anyhow::{Result, anyhow};
use std::sync::Arc;
use tracing::{info, warn};

use crate::classfile::ClassFileDecoder;
use crate::classpath::Classpath;
use crate::config::RegistrarConfig;
use crate::model::{ClassDescriptor, package_of};
use crate::reader::MetadataReader;
use crate::registry::{ComponentRegistry, MergeReport};
use crate::resolve::ClasspathResolver;
use crate::scanner::{PackageScanner, ScanReport};

#[derive(Debug)]
pub struct RegistrationReport {
    pub scan: ScanReport,
    pub merge: MergeReport,
}

#[derive(Debug)]
pub struct Registrar {
    config: RegistrarConfig,
    classpath: Arc<Classpath>,
}

impl Registrar {
    pub fn new(config: RegistrarConfig) -> Self {
        let classpath = Classpath::from_paths(&config.classpath);
        Self::with_classpath(config, classpath)
    }

    /// Uses `classpath` instead of building one from `config.classpath`.
    pub fn with_classpath(config: RegistrarConfig, classpath: Classpath) -> Self {
        Self {
            config,
            classpath: Arc::new(classpath),
        }
    }

    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    pub fn reader(&self) -> MetadataReader {
        MetadataReader::new(self.classpath.clone()).with_decoder(
            ClassFileDecoder::new().with_invisible_annotations(self.config.include_invisible_annotations),
        )
    }

    pub fn scanner(&self) -> PackageScanner {
        let resolver = ClasspathResolver::new(self.classpath.clone())
            .with_platform_prefixes(self.config.platform_prefixes.iter().cloned());
        PackageScanner::new(self.reader(), self.config.marker.clone()).with_resolver(resolver)
    }

    /// A fresh registry honoring the configured key conflict policy.
    pub fn new_registry(&self) -> ComponentRegistry {
        ComponentRegistry::with_policy(self.config.key_conflict)
    }

    /// Configured packages; else the entry point's scan annotation; else the
    /// entry point's own package; else the root package.
    pub fn base_packages(&self) -> Vec<String> {
        if !self.config.base_packages.is_empty() {
            return self.config.base_packages.clone();
        }

        let Some(entry_point) = self.config.entry_point.as_deref() else {
            warn!("no base packages or entry point configured, scanning the whole class path");
            return vec![String::new()];
        };

        match self.describe(entry_point) {
            Ok(descriptor) => {
                let declared = descriptor
                    .annotation(&self.config.scan_annotation)
                    .and_then(|a| a.element("value"))
                    .and_then(|v| v.as_string_array())
                    .unwrap_or_default();
                if !declared.is_empty() {
                    return declared;
                }
            }
            Err(e) => {
                warn!(entry_point, error = %e, "entry point not readable, using its package");
            }
        }
        vec![package_of(entry_point).to_string()]
    }

    pub fn scan(&self) -> ScanReport {
        let packages = self.base_packages();
        info!(packages = ?packages, marker = %self.config.marker, "scanning for components");
        self.scanner().scan_with_report(packages)
    }

    /// Runs one scan and merges the result into `registry`. Never fails;
    /// problems end up in the report and the log.
    pub fn register(&self, registry: &ComponentRegistry) -> RegistrationReport {
        let scan = self.scan();
        let merge = registry.merge(&scan.candidates);
        RegistrationReport { scan, merge }
    }

    /// [`register`](Self::register) against [`ComponentRegistry::global`].
    pub fn register_global(&self) -> RegistrationReport {
        if !ComponentRegistry::init_global(self.config.key_conflict)
            && ComponentRegistry::global().policy() != self.config.key_conflict
        {
            warn!(
                configured = ?self.config.key_conflict,
                active = ?ComponentRegistry::global().policy(),
                "global registry already initialized with another key conflict policy"
            );
        }
        self.register(ComponentRegistry::global())
    }

    /// Decoded metadata of one class on the class path.
    pub fn describe(&self, class_name: &str) -> Result<ClassDescriptor> {
        self.reader()
            .read_class(class_name)?
            .ok_or_else(|| anyhow!("Class not found on the class path: {class_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::MemoryEntry;
    use crate::model::TypeKey;
    use crate::testutil::{ClassSpec, ElementSpec};

    const MARKER: &str = "x.XmzComponent";
    const SCAN: &str = "x.XmzComponentScan";

    fn config() -> RegistrarConfig {
        RegistrarConfig {
            marker: MARKER.to_string(),
            scan_annotation: SCAN.to_string(),
            ..RegistrarConfig::default()
        }
    }

    fn classpath(classes: &[ClassSpec]) -> Classpath {
        let mut entry = MemoryEntry::new("mem");
        for c in classes {
            entry.insert(c.resource_path(), c.build());
        }
        let mut cp = Classpath::new();
        cp.push(entry);
        cp
    }

    fn component(name: &str, key: i32) -> ClassSpec {
        ClassSpec::new(name).annotation(MARKER, &[("value", ElementSpec::Int(key))])
    }

    #[test]
    fn configured_packages_take_precedence() {
        let cfg = RegistrarConfig {
            base_packages: vec!["x.y".to_string()],
            entry_point: Some("app.Main".to_string()),
            ..config()
        };
        let registrar = Registrar::with_classpath(cfg, classpath(&[]));
        assert_eq!(registrar.base_packages(), vec!["x.y".to_string()]);
    }

    #[test]
    fn scan_annotation_on_entry_point_supplies_packages() {
        let main = ClassSpec::new("app.Main").annotation(
            SCAN,
            &[(
                "value",
                ElementSpec::Array(vec![ElementSpec::Str("a.b".into()), ElementSpec::Str("c".into())]),
            )],
        );
        let cfg = RegistrarConfig {
            entry_point: Some("app.Main".to_string()),
            ..config()
        };
        let registrar = Registrar::with_classpath(cfg, classpath(&[main]));
        assert_eq!(registrar.base_packages(), vec!["a.b".to_string(), "c".to_string()]);
    }

    #[test]
    fn empty_scan_annotation_falls_back_to_entry_package() {
        let main = ClassSpec::new("app.start.Main").annotation(SCAN, &[]);
        let cfg = RegistrarConfig {
            entry_point: Some("app.start.Main".to_string()),
            ..config()
        };
        let registrar = Registrar::with_classpath(cfg, classpath(&[main]));
        assert_eq!(registrar.base_packages(), vec!["app.start".to_string()]);

        let missing = Registrar::with_classpath(
            RegistrarConfig {
                entry_point: Some("gone.Main".to_string()),
                ..config()
            },
            classpath(&[]),
        );
        assert_eq!(missing.base_packages(), vec!["gone".to_string()]);
    }

    #[test]
    fn register_populates_registry_and_tolerates_repeats() {
        let cfg = RegistrarConfig {
            entry_point: Some("a.b.App".to_string()),
            ..config()
        };
        let registrar = Registrar::with_classpath(
            cfg,
            classpath(&[
                ClassSpec::new("a.b.App"),
                component("a.b.A1", 1),
                component("a.b.A2", 2),
                ClassSpec::new("a.b.A3"),
            ]),
        );
        let registry = registrar.new_registry();

        let first = registrar.register(&registry);
        assert_eq!(first.merge.inserted, vec![TypeKey(1), TypeKey(2)]);

        let second = registrar.register(&registry);
        assert!(second.merge.inserted.is_empty());
        assert_eq!(second.merge.duplicates(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn describe_reports_missing_classes() {
        let registrar = Registrar::with_classpath(config(), classpath(&[component("a.A", 1)]));
        assert_eq!(registrar.describe("a.A").unwrap().name, "a.A");
        assert!(registrar.describe("a.Missing").is_err());
    }

    #[test]
    fn describe_reads_only_the_requested_class() {
        let mut entry = MemoryEntry::new("mem");
        let main = ClassSpec::new("Main");
        entry.insert(main.resource_path(), main.build());
        entry.insert("Junk.class", b"dummy".to_vec());
        let mut cp = Classpath::new();
        cp.push(entry);

        let registrar = Registrar::with_classpath(config(), cp);
        assert_eq!(registrar.describe("Main").unwrap().name, "Main");
        let err = registrar.describe("Junk").unwrap_err();
        assert!(err.to_string().contains("Junk.class"));
    }
}
