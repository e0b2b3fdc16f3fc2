use core::fmt::{self, Display, Formatter};

use mailsift_common::VerificationStatus;
use serde::{Deserialize, Serialize};

use crate::types::VerificationResult;

/// Results of one batch, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationReport {
    results: Vec<VerificationResult>,
}

impl VerificationReport {
    #[must_use]
    pub const fn new(results: Vec<VerificationResult>) -> Self {
        Self { results }
    }

    #[must_use]
    pub fn results(&self) -> &[VerificationResult] {
        &self.results
    }

    #[must_use]
    pub fn into_results(self) -> Vec<VerificationResult> {
        self.results
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn with_status(
        &self,
        status: VerificationStatus,
    ) -> impl Iterator<Item = &VerificationResult> {
        self.results.iter().filter(move |r| r.status == status)
    }

    pub fn valid_only(&self) -> impl Iterator<Item = &VerificationResult> {
        self.with_status(VerificationStatus::Valid)
    }

    pub fn risky_only(&self) -> impl Iterator<Item = &VerificationResult> {
        self.with_status(VerificationStatus::Risky)
    }

    /// Everything worth sending to.
    pub fn valid_and_risky(&self) -> impl Iterator<Item = &VerificationResult> {
        self.results.iter().filter(|r| r.status.is_sendable())
    }

    #[must_use]
    pub fn summary(&self) -> Summary {
        self.results
            .iter()
            .fold(Summary::default(), |mut summary, result| {
                summary.total += 1;
                match result.status {
                    VerificationStatus::Valid => summary.valid += 1,
                    VerificationStatus::Invalid => summary.invalid += 1,
                    VerificationStatus::Risky => summary.risky += 1,
                    VerificationStatus::Cancelled => summary.cancelled += 1,
                    VerificationStatus::Error => summary.error += 1,
                }
                summary
            })
    }
}

impl IntoIterator for VerificationReport {
    type Item = VerificationResult;
    type IntoIter = std::vec::IntoIter<VerificationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Per-status counts for a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub risky: usize,
    pub cancelled: usize,
    pub error: usize,
}

impl Display for Summary {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "{} checked: {} valid, {} risky, {} invalid",
            self.total, self.valid, self.risky, self.invalid
        )?;
        if self.cancelled > 0 {
            write!(fmt, ", {} cancelled", self.cancelled)?;
        }
        if self.error > 0 {
            write!(fmt, ", {} error", self.error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mailsift_common::ProbeStatus;
    use pretty_assertions::assert_eq;

    use super::*;

    fn report() -> VerificationReport {
        VerificationReport::new(vec![
            VerificationResult::new("a@example.com".to_string()).with_probe(ProbeStatus::Valid),
            VerificationResult::new("b@example.com".to_string()).with_probe(ProbeStatus::Risky),
            VerificationResult::new("c@example.com".to_string()),
            VerificationResult::cancelled("d@example.com".to_string()),
            VerificationResult::new("e@example.com".to_string()).with_probe(ProbeStatus::Valid),
        ])
    }

    #[test]
    fn test_summary() {
        let summary = report().summary();
        assert_eq!(
            summary,
            Summary {
                total: 5,
                valid: 2,
                invalid: 1,
                risky: 1,
                cancelled: 1,
                error: 0,
            }
        );
        assert_eq!(
            summary.to_string(),
            "5 checked: 2 valid, 1 risky, 1 invalid, 1 cancelled"
        );
    }

    #[test]
    fn test_filters() {
        let report = report();
        let addresses = |iter: &mut dyn Iterator<Item = &VerificationResult>| {
            iter.map(|r| r.address.clone()).collect::<Vec<_>>()
        };

        assert_eq!(
            addresses(&mut report.valid_only()),
            vec!["a@example.com", "e@example.com"]
        );
        assert_eq!(addresses(&mut report.risky_only()), vec!["b@example.com"]);
        assert_eq!(
            addresses(&mut report.valid_and_risky()),
            vec!["a@example.com", "b@example.com", "e@example.com"]
        );
        assert_eq!(
            addresses(&mut report.with_status(VerificationStatus::Cancelled)),
            vec!["d@example.com"]
        );
    }
}
