use lazy_static::lazy_static;
use regex::Regex;
use std::env;

lazy_static! {
    static ref ENV_VAR_RE: Regex =
        Regex::new(r"\$\{([A-Za-z0-9_]+)\}|\$([A-Za-z0-9_]+)").expect("invalid env var regex");
}

pub struct VariablesUtils {}

impl VariablesUtils {
    /// Expands ${VAR} or $VAR patterns using the current environment.
    /// Unset variables expand to an empty string.
    pub fn expand_env_vars(input: &str) -> String {
        ENV_VAR_RE
            .replace_all(input, |caps: &regex::Captures| {
                // Capture either ${VAR} or $VAR
                let key = caps.get(1).or(caps.get(2)).unwrap().as_str();
                env::var(key).unwrap_or_else(|_| String::new())
            })
            .to_string()
    }
}
