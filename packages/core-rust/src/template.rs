//! Placeholder rendering on top of `minijinja`.
//!
//! Templates use Jinja expression syntax against a context holding the
//! ledger, e.g. `/items/{{ data[0].id }}`. Undefined lookups are errors, so a
//! reference to a field the earlier response did not contain fails instead of
//! rendering as an empty string. A field that is present but `null` renders
//! as nothing.
//!
//! `{{`, `{%` and `{#` open template syntax. Literal text containing any of
//! them fails to render; a lone `{` is plain text.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use serde_json::Value;

/// Ways rendering a placeholder-bearing field can fail.
#[derive(Debug, thiserror::Error)]
pub enum PlaceholderError {
    /// Template syntax error or unresolvable path.
    #[error("template rendering failed: {0}")]
    Render(#[from] minijinja::Error),
    /// The rendered text of a structured field was no longer valid JSON of
    /// the expected shape.
    #[error("rendered value could not be re-parsed: {0}")]
    Reparse(#[from] serde_json::Error),
}

/// Renders strings and JSON structures as templates.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer").finish_non_exhaustive()
    }
}

impl TemplateRenderer {
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_formatter(|out, state, value| {
            if value.is_none() {
                return Ok(());
            }
            minijinja::escape_formatter(out, state, value)
        });
        Self { env }
    }

    /// Renders `source` against `ctx`.
    ///
    /// Text without template syntax is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PlaceholderError::Render`] on malformed syntax or when an
    /// expression references a path missing from `ctx`.
    pub fn render_str<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, PlaceholderError> {
        Ok(self.env.render_str(source, ctx)?)
    }

    /// Renders a JSON structure by serializing it, rendering the text, and
    /// parsing the result back.
    ///
    /// # Errors
    ///
    /// Returns [`PlaceholderError::Render`] when rendering fails and
    /// [`PlaceholderError::Reparse`] when the rendered text does not parse as
    /// a `T`.
    pub fn render_json<T, S>(&self, value: &T, ctx: S) -> Result<T, PlaceholderError>
    where
        T: Serialize + serde::de::DeserializeOwned,
        S: Serialize,
    {
        let source = serde_json::to_string(value)?;
        let rendered = self.render_str(&source, ctx)?;
        Ok(serde_json::from_str(&rendered)?)
    }

    /// Convenience wrapper for untyped JSON values.
    ///
    /// # Errors
    ///
    /// See [`Self::render_json`].
    pub fn render_value<S: Serialize>(&self, value: &Value, ctx: S) -> Result<Value, PlaceholderError> {
        self.render_json(value, ctx)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn ctx() -> Value {
        json!({
            "data": [
                {"id": 7, "name": "first", "tags": [{"label": "a"}, {"label": "b"}]},
                {"errors": true},
            ]
        })
    }

    #[test]
    fn renders_index_and_field() {
        let r = TemplateRenderer::new();
        assert_eq!(r.render_str("/items/{{data[0].id}}", ctx()).unwrap(), "/items/7");
        assert_eq!(
            r.render_str("/items/{{ data[0].name }}/x", ctx()).unwrap(),
            "/items/first/x"
        );
    }

    #[test]
    fn renders_nested_array_element_field() {
        let r = TemplateRenderer::new();
        assert_eq!(
            r.render_str("{{ data[0].tags[1].label }}", ctx()).unwrap(),
            "b"
        );
    }

    #[test]
    fn missing_field_is_an_error() {
        let r = TemplateRenderer::new();
        let err = r.render_str("/items/{{data[0].missing_field}}", ctx()).unwrap_err();
        assert!(matches!(err, PlaceholderError::Render(_)));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let r = TemplateRenderer::new();
        assert!(r.render_str("{{ data[5].id }}", ctx()).is_err());
    }

    #[test]
    fn malformed_syntax_is_an_error() {
        let r = TemplateRenderer::new();
        assert!(matches!(
            r.render_str("/items/{{ data[0].id", ctx()),
            Err(PlaceholderError::Render(_))
        ));
    }

    #[test]
    fn null_renders_as_empty() {
        let r = TemplateRenderer::new();
        let ctx = json!({"data": [{"x": null}]});
        assert_eq!(r.render_str("/a/{{ data[0].x }}", &ctx).unwrap(), "/a/");
        assert_eq!(
            r.render_value(&json!({"q": "{{ data[0].x }}"}), &ctx).unwrap(),
            json!({"q": ""})
        );
    }

    #[test]
    fn lone_brace_is_literal() {
        let r = TemplateRenderer::new();
        assert_eq!(r.render_str("/a/{b}", ctx()).unwrap(), "/a/{b}");
    }

    #[test]
    fn comment_opener_is_template_syntax() {
        let r = TemplateRenderer::new();
        assert!(matches!(
            r.render_str("/a/{#b", ctx()),
            Err(PlaceholderError::Render(_))
        ));
    }

    #[test]
    fn trailing_newline_is_kept() {
        let r = TemplateRenderer::new();
        assert_eq!(r.render_str("line\n", ctx()).unwrap(), "line\n");
    }

    #[test]
    fn renders_placeholders_inside_json_strings() {
        let r = TemplateRenderer::new();
        let params = json!({"user": {"id": "{{ data[0].id }}", "name": "{{data[0].name}}"}, "n": 1});
        assert_eq!(
            r.render_value(&params, ctx()).unwrap(),
            json!({"user": {"id": "7", "name": "first"}, "n": 1})
        );
    }

    #[test]
    fn rendering_that_breaks_json_is_a_reparse_error() {
        let r = TemplateRenderer::new();
        let ctx = json!({"data": [{"quote": "a\"b"}]});
        let params = json!({"q": "{{ data[0].quote }}"});
        assert!(matches!(
            r.render_value(&params, ctx),
            Err(PlaceholderError::Reparse(_))
        ));
    }

    #[test]
    fn typed_render_rejects_shape_change() {
        let r = TemplateRenderer::new();
        let ctx = json!({"data": [{"v": "x\", \"n\": {\"deep\": 1}, \"z\": \""}]});
        let headers: BTreeMap<String, String> =
            BTreeMap::from([("h".to_string(), "{{ data[0].v }}".to_string())]);
        assert!(matches!(
            r.render_json(&headers, ctx),
            Err(PlaceholderError::Reparse(_))
        ));
    }

    proptest! {
        #[test]
        fn text_without_placeholders_round_trips(
            s in "([a-zA-Z0-9/?&=._~%#} \\-\n]|\\{[a-zA-Z0-9/ ]){0,48}"
        ) {
            let r = TemplateRenderer::new();
            prop_assert_eq!(r.render_str(&s, ctx()).unwrap(), s);
        }

        #[test]
        fn json_without_placeholders_round_trips(
            params in proptest::collection::btree_map("[a-z]{1,8}", "[a-zA-Z0-9 /]{0,16}", 0..6)
        ) {
            let r = TemplateRenderer::new();
            prop_assert_eq!(r.render_json(&params, ctx()).unwrap(), params);
        }
    }
}
