use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use ql_core::{codes, ErrorDetail, QuillError};

use crate::document::SAVE_FORMAT_VERSION;
use crate::legacy::register_builtin_migrations;
use crate::version::SemVer;

/// Upper bound on chain length; a longer walk means the registry is broken.
pub const MAX_MIGRATION_STEPS: usize = 32;

pub type MigrationFn = Box<dyn Fn(JsonValue) -> Result<JsonValue, QuillError>>;

struct MigrationStep {
    to: SemVer,
    transform: MigrationFn,
}

/// Ordered save-document upgrades keyed by exact source version.
pub struct SaveMigrator {
    current: SemVer,
    steps: BTreeMap<SemVer, MigrationStep>,
}

impl SaveMigrator {
    pub fn new(current: SemVer) -> Self {
        Self {
            current,
            steps: BTreeMap::new(),
        }
    }

    /// Migrator targeting the current save format with every built-in step.
    pub fn with_builtin() -> Self {
        let current =
            SemVer::parse(SAVE_FORMAT_VERSION).unwrap_or_else(|_| SemVer::new(1, 0, 0));
        let mut migrator = Self::new(current);
        register_builtin_migrations(&mut migrator);
        migrator
    }

    pub fn current_version(&self) -> SemVer {
        self.current
    }

    pub fn register<F>(&mut self, from: SemVer, to: SemVer, transform: F) -> Result<(), QuillError>
    where
        F: Fn(JsonValue) -> Result<JsonValue, QuillError> + 'static,
    {
        if to <= from {
            return Err(QuillError::new(
                codes::SAVE_MIGRATION,
                format!("Migration {} -> {} does not move forward.", from, to),
            ));
        }
        if self.steps.contains_key(&from) {
            return Err(QuillError::new(
                codes::SAVE_MIGRATION,
                format!("A migration from {} is already registered.", from),
            ));
        }
        self.steps.insert(
            from,
            MigrationStep {
                to,
                transform: Box::new(transform),
            },
        );
        Ok(())
    }

    pub fn document_version(doc: &JsonValue) -> Result<SemVer, QuillError> {
        let raw = doc
            .get("version")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                QuillError::new(codes::SAVE_VERSION, "Save document has no version string.")
            })?;
        SemVer::parse(raw)
    }

    pub fn needs_migration(&self, doc: &JsonValue) -> Result<bool, QuillError> {
        Ok(Self::document_version(doc)? != self.current)
    }

    pub fn migrate(&self, mut doc: JsonValue) -> Result<JsonValue, QuillError> {
        let mut version = Self::document_version(&doc)?;
        if version == self.current {
            return Ok(doc);
        }
        if version > self.current {
            return Err(QuillError::new(
                codes::SAVE_VERSION,
                format!(
                    "Save version {} is newer than supported version {}.",
                    version, self.current
                ),
            )
            .suggest("Load this save with a newer engine build."));
        }

        let start = version;
        for _ in 0..MAX_MIGRATION_STEPS {
            if version == self.current {
                tracing::info!(from = %start, to = %self.current, "save document migrated");
                return Ok(doc);
            }

            let Some(step) = self.steps.get(&version) else {
                if version.patch_compatible(&self.current) {
                    tracing::debug!(
                        from = %version,
                        to = %self.current,
                        "accepting patch-level save difference"
                    );
                    set_version(&mut doc, self.current)?;
                    return Ok(doc);
                }
                return Err(QuillError::new(
                    codes::SAVE_MIGRATION,
                    format!(
                        "No migration registered from version {} toward {}.",
                        version, self.current
                    ),
                )
                .detail(ErrorDetail::MigrationStep {
                    from: version.to_string(),
                    to: None,
                }));
            };

            if step.to > self.current {
                return Err(QuillError::new(
                    codes::SAVE_MIGRATION,
                    format!(
                        "Migration {} -> {} overshoots current version {}.",
                        version, step.to, self.current
                    ),
                ));
            }

            doc = (step.transform)(doc).map_err(|error| {
                QuillError::new(
                    codes::SAVE_MIGRATION,
                    format!(
                        "Migration {} -> {} failed: {}",
                        version, step.to, error.message
                    ),
                )
                .detail(ErrorDetail::MigrationStep {
                    from: version.to_string(),
                    to: Some(step.to.to_string()),
                })
            })?;
            set_version(&mut doc, step.to)?;
            tracing::debug!(from = %version, to = %step.to, "applied save migration");
            version = step.to;
        }

        if version == self.current {
            return Ok(doc);
        }
        Err(QuillError::new(
            codes::SAVE_MIGRATION,
            format!(
                "Migration chain exceeded {} steps at version {}.",
                MAX_MIGRATION_STEPS, version
            ),
        ))
    }
}

fn set_version(doc: &mut JsonValue, version: SemVer) -> Result<(), QuillError> {
    let Some(object) = doc.as_object_mut() else {
        return Err(QuillError::new(
            codes::SAVE_MIGRATION,
            "Migrated save document is not an object.",
        ));
    };
    object.insert(
        "version".to_string(),
        JsonValue::String(version.to_string()),
    );
    Ok(())
}
