//! `{$.path}` placeholder resolution in job params.
//!
//! Placeholders are looked up in the job-scoped `context.data` document:
//! `{$.user.email}` reads `data.user.email`, `{$.items.0.id}` reads the first
//! array element. Resolution is best effort; placeholders that cannot be
//! resolved stay in the text and are logged.

use crate::models::{JobContext, JobParams};
use serde_json::Value;
use tracing::warn;

const PLACEHOLDER_OPEN: &str = "{$.";
const PLACEHOLDER_CLOSE: char = '}';

/// Rewrites placeholders in params before validation.
pub trait TemplateResolver: Send + Sync {
    fn resolve(&self, params: &JobParams, context: &JobContext) -> JobParams;
}

/// Resolves placeholders against `context.data`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobDataTemplateResolver;

impl TemplateResolver for JobDataTemplateResolver {
    fn resolve(&self, params: &JobParams, context: &JobContext) -> JobParams {
        let data = &context.data;
        let field = |value: Option<&str>| value.map(|v| render(v, data));

        JobParams {
            user_principal_name: field(params.user_principal_name.as_deref()),
            role_id: field(params.role_id.as_deref()),
            directory_scope_id: field(params.directory_scope_id.as_deref()),
            justification: field(params.justification.as_deref()),
            address: field(params.address.as_deref()),
            reason: field(params.reason.as_deref()),
        }
    }
}

/// Resolver that returns params unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTemplateResolver;

impl TemplateResolver for NoopTemplateResolver {
    fn resolve(&self, params: &JobParams, _context: &JobContext) -> JobParams {
        params.clone()
    }
}

/// Replace every resolvable placeholder in `input`.
#[must_use]
pub fn render(input: &str, data: &Value) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some((before, after_open)) = rest.split_once(PLACEHOLDER_OPEN) {
        output.push_str(before);

        let Some((path, after_close)) = after_open.split_once(PLACEHOLDER_CLOSE) else {
            // Unterminated placeholder
            output.push_str(PLACEHOLDER_OPEN);
            rest = after_open;
            break;
        };

        match lookup(data, path).and_then(scalar_text) {
            Some(value) => output.push_str(&value),
            None => {
                warn!(
                    target: "role_grant.template",
                    path = %path,
                    "Template placeholder could not be resolved, leaving as-is"
                );
                output.push_str(PLACEHOLDER_OPEN);
                output.push_str(path);
                output.push(PLACEHOLDER_CLOSE);
            }
        }
        rest = after_close;
    }

    output.push_str(rest);
    output
}

fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(data, |node, segment| match node {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
