use async_trait::async_trait;
use edaflow_logs::{categorize, recommendations, LogSummary};

use crate::collaborator::{Classification, RootCauseClassifier};
use crate::error::CollaboratorError;
use crate::record::Outcome;

/// Default classifier driven by the reduced log alone.
///
/// Any ERROR match is a FAILURE. Without errors, timing violations or a
/// failing tool make the iteration PARTIAL. Otherwise it is a SUCCESS.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn verdict(&self, summary: &LogSummary, tool_success: bool) -> Classification {
        let categories = categorize(summary);
        let outcome = if summary.error_count() > 0 {
            Outcome::Failure
        } else if summary.matched_counts.timing > 0 || !tool_success {
            Outcome::Partial
        } else {
            Outcome::Success
        };

        let mut recs = recommendations(&categories);
        if outcome != Outcome::Success && recs.is_empty() {
            recs.push(if tool_success {
                "Errors matched no known category. Review the retained log entries.".to_string()
            } else {
                "Tool reported failure without matching diagnostics. Inspect the full log.".to_string()
            });
        }
        Classification {
            outcome,
            recommendations: recs,
        }
    }
}

#[async_trait]
impl RootCauseClassifier for HeuristicClassifier {
    async fn classify(
        &self,
        summary: &LogSummary,
        tool_success: bool,
    ) -> Result<Classification, CollaboratorError> {
        Ok(self.verdict(summary, tool_success))
    }
}
