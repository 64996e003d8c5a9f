// file: src/upgrade/classifier.rs
// version: 1.0.0
// guid: 91e6a0d4-7c2b-48f3-b15d-3f8c6e2a04d7

//! Keyword classification of raw device output

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome derived from command output
///
/// Variants are ordered by precedence: when several keywords are present,
/// the highest one wins, so any error or failure line dominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Unknown,
    Installed,
    Success,
    Failed,
    Error,
}

impl Classification {
    pub fn is_failure(&self) -> bool {
        matches!(self, Classification::Error | Classification::Failed)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Classification::Success | Classification::Installed)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Unknown => "unknown",
            Classification::Installed => "installed",
            Classification::Success => "success",
            Classification::Failed => "failed",
            Classification::Error => "error",
        };
        f.write_str(s)
    }
}

/// One entry of the keyword table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub token: String,
    pub outcome: Classification,
}

impl Keyword {
    pub fn new(token: &str, outcome: Classification) -> Self {
        Self {
            token: token.to_ascii_lowercase(),
            outcome,
        }
    }
}

/// Default device vocabulary
pub fn default_keywords() -> Vec<Keyword> {
    vec![
        Keyword::new("error", Classification::Error),
        Keyword::new("installed", Classification::Installed),
        Keyword::new("fail", Classification::Failed),
        Keyword::new("success", Classification::Success),
    ]
}

/// Classified command output. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    #[serde(skip_serializing)]
    pub raw: String,
    /// Lines that matched at least one keyword, in output order
    pub lines: Vec<String>,
    pub classification: Classification,
}

/// Scans output lines against a keyword table
#[derive(Debug, Clone)]
pub struct ResultClassifier {
    keywords: Vec<Keyword>,
}

impl ResultClassifier {
    pub fn new() -> Self {
        Self::with_keywords(default_keywords())
    }

    pub fn with_keywords(keywords: Vec<Keyword>) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|k| Keyword::new(&k.token, k.outcome))
            .filter(|k| !k.token.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    pub fn classify(&self, raw_output: &str) -> ExecutionResult {
        let mut lines = Vec::new();
        let mut classification = Classification::Unknown;

        for line in raw_output.lines() {
            let lowered = line.to_ascii_lowercase();
            let mut interesting = false;
            for keyword in &self.keywords {
                if lowered.contains(&keyword.token) {
                    interesting = true;
                    classification = classification.max(keyword.outcome);
                }
            }
            if interesting {
                lines.push(line.trim_end().to_string());
            }
        }

        ExecutionResult {
            raw: raw_output.to_string(),
            lines,
            classification,
        }
    }
}

impl Default for ResultClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_and_installed_is_error() {
        let output = "Loading image...\n\
                      %Error opening flash:/update/info (No such file or directory)\n\
                      All software images installed.\n";
        let result = ResultClassifier::new().classify(output);
        assert_eq!(result.classification, Classification::Error);
        assert_eq!(result.lines.len(), 2);
    }

    #[test]
    fn test_installed_and_success_is_success() {
        let output = "install_add_activate_commit: START\n\
                      SUCCESS: Software provisioned\n\
                      All software images installed.\n\
                      [1 2]: Finished install successful\n";
        let result = ResultClassifier::new().classify(output);
        assert_eq!(result.classification, Classification::Success);
        assert_eq!(result.lines.len(), 3);
    }

    #[test]
    fn test_installed_only() {
        let result = ResultClassifier::new().classify("All software images installed.");
        assert_eq!(result.classification, Classification::Installed);
        assert!(result.classification.is_success());
    }

    #[test]
    fn test_fail_without_error_is_failed() {
        let result = ResultClassifier::new()
            .classify("FAILED: install_add_activate_commit exit(1)\nSUCCESS: copy");
        assert_eq!(result.classification, Classification::Failed);
        assert!(result.classification.is_failure());
    }

    #[test]
    fn test_case_insensitive_and_unknown() {
        let classifier = ResultClassifier::new();
        assert_eq!(
            classifier.classify("SUCCESS: Finished installing software").classification,
            Classification::Success
        );

        let quiet = classifier.classify("Loading http://10.1.1.5:8000/img.tar !!!!!!!!\n");
        assert_eq!(quiet.classification, Classification::Unknown);
        assert!(quiet.lines.is_empty());
        assert!(classifier.classify("").lines.is_empty());
    }

    #[test]
    fn test_custom_keywords() {
        let classifier = ResultClassifier::with_keywords(vec![
            Keyword::new("ABORTED", Classification::Failed),
            Keyword::new("", Classification::Error),
        ]);
        assert_eq!(classifier.keywords().len(), 1);
        assert_eq!(
            classifier.classify("Install aborted by user").classification,
            Classification::Failed
        );
        assert_eq!(
            classifier.classify("error everywhere").classification,
            Classification::Unknown
        );
    }
}
