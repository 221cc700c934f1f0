use lazy_static::lazy_static;
use regex::Regex;
use semver::{Version, VersionReq};

use crate::utils::errors::{ResultTrait as _, ResultWithError};

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"\d+\.\d+(\.\d+)?").unwrap();
}

pub struct SemverUtils {}

impl SemverUtils {
    /// Checks whether the version embedded in `input` (e.g. the output of
    /// `git --version`) satisfies `min_version`.
    pub fn is_version_greater_or_equal(min_version: &str, input: &str) -> ResultWithError<bool> {
        if let Some(capt) = VERSION_RE.find(input) {
            let found_version = Self::parse_lenient(capt.as_str())
                .auto_err(&format!("Failed to parse version: {}", capt.as_str()))?;

            let required_version = VersionReq::parse(&format!(">={min_version}"))
                .auto_err(&format!("Invalid min_version in config: {}", min_version))?;

            return Ok(required_version.matches(&found_version));
        }

        Ok(false)
    }

    pub fn is_valid_version(input: &str) -> bool {
        if let Some(capt) = VERSION_RE.find(input) {
            return Self::parse_lenient(capt.as_str()).is_ok();
        }
        false
    }

    // Tool output often reports "2.43" style two-component versions.
    fn parse_lenient(version: &str) -> Result<Version, semver::Error> {
        if version.matches('.').count() == 1 {
            return Version::parse(&format!("{version}.0"));
        }
        Version::parse(version)
    }
}
