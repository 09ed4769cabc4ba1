//! Readiness classification of captured command output.
//!
//! Status commands print human-readable text; the only stable signal is
//! whether a transient-state word is present. Classifiers stay pluggable so
//! scenarios can swap markers without touching the poller.

pub trait OutputClassifier {
    fn is_ready(&self, output: &str) -> bool;
}

impl<F> OutputClassifier for F
where
    F: Fn(&str) -> bool,
{
    fn is_ready(&self, output: &str) -> bool {
        self(output)
    }
}

/// Ready when the keyword does not occur anywhere in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegativeKeyword {
    keyword: String,
}

impl NegativeKeyword {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }
}

impl OutputClassifier for NegativeKeyword {
    fn is_ready(&self, output: &str) -> bool {
        !output.contains(&self.keyword)
    }
}
