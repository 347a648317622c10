use chrono::NaiveDateTime;

pub use crate::config::*;

/// A builder for collecting classifications and running the whole pipeline.
///
/// ```
/// use chrono::NaiveDate;
/// use rater_reliability::builder::Builder;
/// use rater_reliability::{ReliabilityErrors, ResolutionRules, ScoringRules};
///
/// let t = NaiveDate::from_ymd_opt(2017, 11, 26)
///     .and_then(|d| d.and_hms_opt(12, 0, 0))
///     .unwrap();
/// let mut builder = Builder::new();
/// for (rater, item, answer) in [
///     ("Anna", "deed-1", "Yes"),
///     ("Anna", "deed-2", "No"),
///     ("Bob", "deed-1", "Yes"),
///     ("Bob", "deed-2", "No"),
/// ] {
///     builder.add_classification(rater, item, answer, t)?;
/// }
///
/// let scores = builder.reliability(&ScoringRules::DEFAULT_RULES)?;
/// assert_eq!(scores.scores.len(), 2);
///
/// let consensus = builder.consensus(&ScoringRules::DEFAULT_RULES, &ResolutionRules::default())?;
/// assert_eq!(consensus.results[0].resolved_answer, "Yes");
/// # Ok::<(), ReliabilityErrors>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    pub(crate) _records: Vec<ClassificationRecord>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            _records: Vec::new(),
        }
    }

    /// Adds a classification made by a rater on an item.
    ///
    /// Rater and item identifiers must not be empty.
    pub fn add_classification(
        &mut self,
        rater_id: &str,
        item_id: &str,
        answer: &str,
        timestamp: NaiveDateTime,
    ) -> Result<(), ReliabilityErrors> {
        self.add_record(&ClassificationRecord {
            rater_id: rater_id.to_string(),
            item_id: item_id.to_string(),
            answer: answer.to_string(),
            timestamp,
            retired: None,
        })
    }

    pub fn add_record(&mut self, record: &ClassificationRecord) -> Result<(), ReliabilityErrors> {
        if record.rater_id.is_empty() || record.item_id.is_empty() {
            return Err(ReliabilityErrors::MalformedInput(format!(
                "empty rater or item identifier in {:?}",
                record
            )));
        }
        self._records.push(record.clone());
        Ok(())
    }

    pub fn records(&self) -> &[ClassificationRecord] {
        &self._records
    }

    pub fn reliability(&self, rules: &ScoringRules) -> Result<ReliabilityResult, ReliabilityErrors> {
        crate::run_reliability_scores(&self._records, rules)
    }

    /// Scores the raters, then resolves the items with these scores.
    pub fn consensus(
        &self,
        scoring: &ScoringRules,
        resolution: &ResolutionRules,
    ) -> Result<ConsensusOutcome, ReliabilityErrors> {
        let scores = self.reliability(scoring)?;
        crate::resolve_consensus(&self._records, &scores.standings(), resolution)
    }
}
