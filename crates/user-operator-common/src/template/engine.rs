//! Template engine for provisioning policies
//!
//! Wraps a minijinja environment with the default `{{ }}` / `{% %}` syntax.
//! Templates pass through [`go_compat`](super::go_compat) first, so Go
//! text/template actions work alongside native minijinja syntax.
//!
//! Undefined values are chainable: `{{ Extra.missing.deeper }}` renders as an
//! empty string instead of failing, so a template that references an optional
//! attribute still produces a manifest. Go would print `<no value>` there.

use std::fmt::Write;

use minijinja::value::ValueKind;
use minijinja::{
    escape_formatter, Environment, Error, ErrorKind, Output, State, UndefinedBehavior, Value,
};

use super::context::TemplateContext;
use super::error::TemplateError;
use super::filters;
use super::go_compat;

/// Renders policy templates against a [`TemplateContext`]
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create a new engine with the policy filters registered
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_formatter(go_formatter);

        env.add_filter("default", filters::default_filter);
        env.add_filter("base64_encode", filters::base64_encode);
        env.add_filter("base64_decode", filters::base64_decode);
        env.add_filter("required", filters::required);
        env.add_filter("upper", filters::upper);
        env.add_filter("lower", filters::lower);
        env.add_filter(go_compat::RANGE_FILTER, filters::range_pairs);

        Self { env }
    }

    /// Render a template string with the given context
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Syntax` if the template does not parse (or
    /// uses an unsupported Go action) and `TemplateError::Render` if
    /// evaluation fails (e.g. a `required` value is missing).
    pub fn render(&self, template: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
        let translated = go_compat::translate(template).map_err(TemplateError::Syntax)?;
        self.env
            .render_str(&translated, ctx.to_value())
            .map_err(|e| match e.kind() {
                ErrorKind::SyntaxError => TemplateError::Syntax(e.to_string()),
                _ => TemplateError::Render(e),
            })
    }
}

/// Print lists and maps the way Go's text/template does (`[a b]`,
/// `map[k:v]`); scalars use the default formatter.
fn go_formatter(out: &mut Output<'_>, state: &State<'_, '_>, value: &Value) -> Result<(), Error> {
    match value.kind() {
        ValueKind::Seq | ValueKind::Map => out.write_str(&go_display(value)?).map_err(|e| {
            Error::new(ErrorKind::WriteFailure, format!("failed to write output: {}", e))
        }),
        _ => escape_formatter(out, state, value),
    }
}

fn go_display(value: &Value) -> Result<String, Error> {
    match value.kind() {
        ValueKind::Seq | ValueKind::Iterable => {
            let items = value
                .try_iter()?
                .map(|item| go_display(&item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("[{}]", items.join(" ")))
        }
        ValueKind::Map => {
            let mut pairs = Vec::new();
            for key in value.try_iter()? {
                let item = value.get_item(&key)?;
                pairs.push(format!("{}:{}", go_display(&key)?, go_display(&item)?));
            }
            Ok(format!("map[{}]", pairs.join(" ")))
        }
        ValueKind::None | ValueKind::Undefined => Ok("<nil>".to_string()),
        _ => Ok(value.to_string()),
    }
}
