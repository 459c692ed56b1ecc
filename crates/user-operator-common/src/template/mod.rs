//! Manifest templating for provisioning policies
//!
//! Policy templates use minijinja's default `{{ ... }}` / `{% ... %}` syntax
//! and see five top-level values:
//! - `Namespace` - the computed workspace namespace
//! - `Username`, `UID` - identity attributes
//! - `Groups` - list of group names
//! - `Extra` - map of attribute name to list of values
//!
//! Templates written for Go's text/template also work: field references,
//! `if`/`else`/`end`, `range`, `with`, variables and the common builtins
//! (`index`, `len`, `eq`, `and`, ...) are rewritten into minijinja syntax
//! before parsing, and lists and maps print the way Go prints them. Missing
//! fields render empty rather than as `<no value>`.

mod context;
mod engine;
mod error;
mod filters;
mod go_compat;

pub use context::TemplateContext;
pub use engine::TemplateEngine;
pub use error::TemplateError;
