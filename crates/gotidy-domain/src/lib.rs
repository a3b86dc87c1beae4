#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod imports;
pub mod layout;
pub mod modfile;

pub use imports::{has_import_block, import_block_spans, strip_import_comments};
pub use layout::{ModuleLayout, GO_MOD, GO_SUM, GO_WORK, GO_WORK_SUM, MODULE_FILES};
pub use modfile::{auto_quote, unquote, ModFile, ModParseError, Requirement};
