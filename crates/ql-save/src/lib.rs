mod document;
mod legacy;
mod migrator;
mod validate;
mod version;

pub use document::{RngRecord, SaveDocument, TunnelRecord, SAVE_FORMAT_VERSION};
pub use legacy::register_builtin_migrations;
pub use migrator::{MigrationFn, SaveMigrator, MAX_MIGRATION_STEPS};
pub use validate::{validate, validate_document};
pub use version::SemVer;
