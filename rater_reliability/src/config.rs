// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

use chrono::NaiveDateTime;

/// One classification made by a rater on an item.
///
/// A rater may have seen the same item several times. Only the most recent
/// classification is taken into account.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct ClassificationRecord {
    pub rater_id: String,
    pub item_id: String,
    pub answer: String,
    pub timestamp: NaiveDateTime,
    /// The retirement status reported by the project, if any.
    pub retired: Option<bool>,
}

/// The outcome of a computed statistic.
///
/// Undefined values (0/0) are never coerced to a number: they are dropped
/// from averages instead.
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum Statistic {
    Defined(f64),
    /// The value is mathematically undefined.
    Undefined,
    /// The value was not computed for this row.
    NotApplicable,
}

impl Statistic {
    /// Division that turns a zero denominator into `Undefined`.
    pub fn ratio(num: f64, denom: f64) -> Statistic {
        if denom == 0.0 {
            Statistic::Undefined
        } else {
            Statistic::Defined(num / denom)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Statistic::Defined(x) => Some(*x),
            _ => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Statistic::Defined(_))
    }
}

// ******** Output data structures *********

/// Agreement statistics between two raters, over the items they both classified.
///
/// The pair is unordered: `rater_a` always sorts before `rater_b`.
#[derive(PartialEq, Debug, Clone)]
pub struct RaterPairAgreement {
    pub rater_a: String,
    pub rater_b: String,
    /// Sorted.
    pub items_in_common: Vec<String>,
    pub agreement_coefficient: Statistic,
    pub n_agreements: u64,
    pub n_disagreements: u64,
    pub perc_agreements: Statistic,
    pub perc_disagreements: Statistic,
    pub agree_disagree_ratio: Statistic,
}

impl RaterPairAgreement {
    pub fn involves(&self, rater_id: &str) -> bool {
        self.rater_a == rater_id || self.rater_b == rater_id
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct ReliabilityScore {
    pub rater_id: String,
    /// Average of the defined agreement coefficients with all the other raters.
    pub mean_agreement_coefficient: f64,
    pub n_classifications: u64,
    /// mean_agreement_coefficient * ln(n_classifications)
    pub reliability_score: f64,
    /// Descending rank, 1 is the most reliable. Ties share the average of their positions.
    pub rank: f64,
    pub is_bottom_tier: bool,
}

/// Why a rater did not receive a reliability score.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ExclusionReason {
    /// The rater does not share a single item with any other rater.
    NoSharedItems,
    /// All the agreement coefficients of this rater are undefined.
    NoDefinedAgreement,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RaterExclusion {
    pub rater_id: String,
    pub n_classifications: u64,
    pub reason: ExclusionReason,
}

/// How much a rater overlaps with the rest of the raters.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RaterOverlap {
    pub rater_id: String,
    /// Number of other raters sharing at least one item.
    pub n_partners: u64,
    /// Sum over all the partners of the number of items in common.
    pub n_shared_items: u64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ReliabilityResult {
    /// Sorted by rank, then rater id.
    pub scores: Vec<ReliabilityScore>,
    /// Pairs with at least one item in common, sorted by (rater_a, rater_b).
    pub pairs: Vec<RaterPairAgreement>,
    pub exclusions: Vec<RaterExclusion>,
    /// One entry per rater, sorted by rater id.
    pub overlaps: Vec<RaterOverlap>,
}

impl ReliabilityResult {
    /// The reliability table, as consumed by the consensus resolver.
    pub fn standings(&self) -> Vec<RaterStanding> {
        self.scores
            .iter()
            .map(|s| RaterStanding {
                rater_id: s.rater_id.clone(),
                reliability_score: s.reliability_score,
                rank: s.rank,
            })
            .collect()
    }
}

/// A row of the reliability table.
#[derive(PartialEq, Debug, Clone)]
pub struct RaterStanding {
    pub rater_id: String,
    pub reliability_score: f64,
    pub rank: f64,
}

/// One rater's opinion on a conflicted item.
#[derive(PartialEq, Debug, Clone)]
pub struct EvidenceEntry {
    pub rater_id: String,
    pub answer: String,
    pub rank: f64,
    pub reliability_score: f64,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ResolutionState {
    /// A single most common answer exists.
    ModeClear,
    /// Tie, broken by the most reliable rater.
    TiedNoUnknown,
    /// Tie, the most reliable rater answered with the unknown answer. Another
    /// acceptable answer was found further down the list.
    TiedWithUnknown,
    /// Tie, the most reliable rater answered with the unknown answer and
    /// no acceptable alternative was found.
    TiedWithUnknownUnresolvable,
}

/// The result of walking down the list of raters looking for an acceptable answer.
#[derive(PartialEq, Debug, Clone)]
pub struct NextBestAnswer {
    pub answer: Option<String>,
    pub rank: Option<f64>,
    /// The position in the rank-sorted list.
    pub index: Option<usize>,
    pub could_not_find: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ConsensusResult {
    pub item_id: String,
    pub resolved_answer: String,
    pub state: ResolutionState,
    pub is_conflicted: bool,
    pub is_unknown_flagged: bool,
    pub n_raters: u64,
    /// Only for conflicted items.
    pub top_rater: Option<String>,
    /// Ratio of the reliability scores of the two best raters. Low values
    /// mean that raters of similar reliability disagree.
    pub top_two_ratio: Statistic,
    pub avg_rater_rank: Statistic,
    /// Sorted by rank. Empty if the item is not conflicted.
    pub evidence: Vec<EvidenceEntry>,
    /// Only when the top answer of a conflicted item is the unknown answer.
    pub next_best: Option<NextBestAnswer>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ItemExclusionReason {
    NotRetired { n_raters: u64 },
    /// None of the raters of this item has a reliability score.
    NoScoredRaters,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ItemExclusion {
    pub item_id: String,
    pub reason: ItemExclusionReason,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ConsensusOutcome {
    /// Sorted by item id.
    pub results: Vec<ConsensusResult>,
    pub excluded_items: Vec<ItemExclusion>,
    /// Raters with classifications but no reliability score, sorted.
    pub excluded_raters: Vec<String>,
}

/// Errors that prevent the algorithms from completing successfully.
///
/// Problems local to a pair of raters or to an item are never errors: they
/// are recorded on the results.
#[derive(PartialEq, Debug, Clone)]
pub enum ReliabilityErrors {
    MalformedInput(String),
    AnswerOutsideDomain {
        rater_id: String,
        item_id: String,
        answer: String,
    },
    /// The answers and the ranks given to the resolution walk do not line up.
    MismatchedWalk {
        answers: usize,
        ranks: usize,
    },
    EmptyWalk,
    InvalidRules(String),
}

impl Error for ReliabilityErrors {}

impl Display for ReliabilityErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReliabilityErrors::MalformedInput(msg) => write!(f, "malformed input: {}", msg),
            ReliabilityErrors::AnswerOutsideDomain {
                rater_id,
                item_id,
                answer,
            } => write!(
                f,
                "answer {:?} of rater {:?} on item {:?} is not an expected answer",
                answer, rater_id, item_id
            ),
            ReliabilityErrors::MismatchedWalk { answers, ranks } => write!(
                f,
                "cannot walk {} answers with {} ranks: both lists must have the same length",
                answers, ranks
            ),
            ReliabilityErrors::EmptyWalk => write!(f, "cannot walk an empty list of answers"),
            ReliabilityErrors::InvalidRules(msg) => write!(f, "invalid rules: {}", msg),
        }
    }
}

// ********* Configuration **********

#[derive(PartialEq, Debug, Clone)]
pub struct ScoringRules {
    /// The fraction of raters, at the bottom of the ranking, flagged as low reliability.
    pub bottom_tier_fraction: f64,
    /// If provided, any answer outside this list aborts the computation.
    pub answer_domain: Option<Vec<String>>,
}

impl ScoringRules {
    pub const DEFAULT_RULES: ScoringRules = ScoringRules {
        bottom_tier_fraction: 0.2,
        answer_domain: None,
    };

    pub(crate) fn check(&self) -> Result<(), ReliabilityErrors> {
        if !(0.0..=1.0).contains(&self.bottom_tier_fraction) {
            return Err(ReliabilityErrors::InvalidRules(format!(
                "bottom tier fraction must be between 0 and 1, got {}",
                self.bottom_tier_fraction
            )));
        }
        Ok(())
    }
}

/// Which items are eligible for consensus.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RetirementPolicy {
    AllItems,
    /// At least one record of the item is marked as retired.
    Flagged,
    /// The item was classified by at least this number of distinct raters.
    MinimumRaters(u32),
    FlaggedOrMinimumRaters(u32),
}

#[derive(PartialEq, Debug, Clone)]
pub struct ResolutionRules {
    /// The answer that means "could not figure this one out".
    pub unknown_answer: String,
    /// The answers that may replace an unknown top answer.
    pub acceptable_answers: Vec<String>,
    /// Only raters with a rank strictly below this value may provide a replacement answer.
    pub rank_ceiling: f64,
    pub retirement: RetirementPolicy,
    pub answer_domain: Option<Vec<String>>,
}

impl Default for ResolutionRules {
    fn default() -> Self {
        ResolutionRules {
            unknown_answer: "I can't figure this one out.".to_string(),
            acceptable_answers: vec!["Yes".to_string(), "No".to_string()],
            rank_ceiling: 1000.0,
            retirement: RetirementPolicy::AllItems,
            answer_domain: None,
        }
    }
}

impl ResolutionRules {
    pub(crate) fn check(&self) -> Result<(), ReliabilityErrors> {
        if self.rank_ceiling.is_nan() {
            return Err(ReliabilityErrors::InvalidRules(
                "rank ceiling is not a number".to_string(),
            ));
        }
        if let RetirementPolicy::MinimumRaters(0) | RetirementPolicy::FlaggedOrMinimumRaters(0) =
            self.retirement
        {
            return Err(ReliabilityErrors::InvalidRules(
                "the minimum number of raters must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Checks that all the answers belong to the domain, if one is provided.
pub(crate) fn check_domain(
    records: &[ClassificationRecord],
    domain: &Option<Vec<String>>,
) -> Result<(), ReliabilityErrors> {
    if let Some(domain) = domain {
        for r in records.iter() {
            if !domain.contains(&r.answer) {
                return Err(ReliabilityErrors::AnswerOutsideDomain {
                    rater_id: r.rater_id.clone(),
                    item_id: r.item_id.clone(),
                    answer: r.answer.clone(),
                });
            }
        }
    }
    Ok(())
}
