// src/template.rs

//! `${NAME}` placeholder expansion shared by command arguments and batch
//! arguments.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.\-]*)\}").expect("placeholder regex is valid")
});

/// Expand every `${NAME}` in `input` using `lookup`.
///
/// Fails with the first name `lookup` cannot resolve.
pub fn expand_strict<F>(input: &str, lookup: F) -> Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing: Option<String> = None;
    let out = PLACEHOLDER.replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        match lookup(name) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| name.to_string());
                caps[0].to_string()
            }
        }
    });
    match missing {
        Some(name) => Err(name),
        None => Ok(out.into_owned()),
    }
}

/// Expand every `${NAME}` in `input`, leaving unknown names verbatim.
pub fn expand_lenient<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
