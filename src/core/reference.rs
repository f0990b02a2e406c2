//! `${namespace.key}` references inside step parameters

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("reference pattern is valid"));

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("segment pattern is valid"));

/// Namespace for pipeline-level environment bindings
pub const ENV_NAMESPACE: &str = "env";

/// Namespace for manual-trigger inputs
pub const INPUTS_NAMESPACE: &str = "inputs";

/// A parsed reference to a value that is only known when the pipeline runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// `${env.NAME}`
    Env(String),
    /// `${inputs.NAME}`
    Input(String),
    /// `${step_id.output_key}`
    StepOutput { step: String, key: String },
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Env(name) => write!(f, "${{{}.{}}}", ENV_NAMESPACE, name),
            Reference::Input(name) => write!(f, "${{{}.{}}}", INPUTS_NAMESPACE, name),
            Reference::StepOutput { step, key } => write!(f, "${{{}.{}}}", step, key),
        }
    }
}

/// Check whether a string is usable as a step id or output key
pub fn is_valid_segment(s: &str) -> bool {
    SEGMENT.is_match(s)
}

fn parse_expression(expression: &str) -> Option<Reference> {
    let (namespace, key) = expression.trim().split_once('.')?;
    if !is_valid_segment(namespace) || !is_valid_segment(key) {
        return None;
    }

    Some(match namespace {
        ENV_NAMESPACE => Reference::Env(key.to_string()),
        INPUTS_NAMESPACE => Reference::Input(key.to_string()),
        _ => Reference::StepOutput {
            step: namespace.to_string(),
            key: key.to_string(),
        },
    })
}

/// Extract every reference in a template
///
/// Returns the raw text of the first malformed `${...}` expression as the error.
pub fn parse_references(template: &str) -> Result<Vec<Reference>, String> {
    REFERENCE
        .captures_iter(template)
        .map(|caps| parse_expression(&caps[1]).ok_or_else(|| caps[0].to_string()))
        .collect()
}

/// Replace every reference in `template` using `lookup`
///
/// Stops at the first reference `lookup` cannot resolve and returns it.
pub fn substitute<F>(template: &str, mut lookup: F) -> Result<String, Reference>
where
    F: FnMut(&Reference) -> Option<String>,
{
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in REFERENCE.captures_iter(template) {
        let whole = caps.get(0).expect("capture 0 always exists");
        rendered.push_str(&template[last..whole.start()]);

        match parse_expression(&caps[1]) {
            Some(reference) => match lookup(&reference) {
                Some(value) => rendered.push_str(&value),
                None => return Err(reference),
            },
            // Malformed expressions are rejected at load time; pass through verbatim.
            None => rendered.push_str(whole.as_str()),
        }
        last = whole.end();
    }

    rendered.push_str(&template[last..]);
    Ok(rendered)
}
