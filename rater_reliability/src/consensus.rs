//! Resolution of the disagreements between raters.
//!
//! Every item receives a single answer: the most common answer when there is one,
//! otherwise the answer of the most reliable rater.

use log::{debug, info, warn};
use rayon::prelude::*;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::config::*;
use crate::deduplicate_latest;

enum ItemOutcome {
    Resolved(ConsensusResult),
    Excluded(ItemExclusion),
}

/// Walks down a rank-sorted list of answers, starting from the second entry, looking
/// for the first answer that is acceptable and given by a rater ranked strictly below
/// the rank ceiling.
///
/// ```
/// use rater_reliability::find_next_acceptable;
///
/// let answers = ["I can't figure this one out.", "Yes"];
/// let ranks = [1.0, 23.0];
/// let acceptable = vec!["Yes".to_string(), "No".to_string()];
/// let next = find_next_acceptable(&answers, &ranks, &acceptable, 1000.0)?;
/// assert_eq!(next.answer, Some("Yes".to_string()));
/// assert_eq!(next.rank, Some(23.0));
/// assert_eq!(next.index, Some(1));
/// assert!(!next.could_not_find);
/// # Ok::<(), rater_reliability::ReliabilityErrors>(())
/// ```
pub fn find_next_acceptable<S: AsRef<str>>(
    answers: &[S],
    ranks: &[f64],
    acceptable: &[String],
    rank_ceiling: f64,
) -> Result<NextBestAnswer, ReliabilityErrors> {
    if answers.len() != ranks.len() {
        return Err(ReliabilityErrors::MismatchedWalk {
            answers: answers.len(),
            ranks: ranks.len(),
        });
    }
    if answers.is_empty() {
        return Err(ReliabilityErrors::EmptyWalk);
    }
    let acceptable: HashSet<&str> = acceptable.iter().map(|s| s.as_str()).collect();
    for (idx, (answer, rank)) in answers.iter().zip(ranks.iter()).enumerate().skip(1) {
        let answer: &str = answer.as_ref();
        if acceptable.contains(answer) && *rank < rank_ceiling {
            return Ok(NextBestAnswer {
                answer: Some(answer.to_string()),
                rank: Some(*rank),
                index: Some(idx),
                could_not_find: false,
            });
        }
    }
    Ok(NextBestAnswer {
        answer: None,
        rank: None,
        index: None,
        could_not_find: true,
    })
}

// Most reliable first. The rater id makes the order total.
fn evidence_order(x: &EvidenceEntry, y: &EvidenceEntry) -> Ordering {
    x.rank
        .partial_cmp(&y.rank)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            y.reliability_score
                .partial_cmp(&x.reliability_score)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| x.rater_id.cmp(&y.rater_id))
}

/// The unique most common answer, if any.
fn unique_mode(entries: &[EvidenceEntry]) -> Option<&str> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for e in entries.iter() {
        *counts.entry(e.answer.as_str()).or_insert(0) += 1;
    }
    let max_count = counts.values().cloned().max()?;
    let mut modes = counts.iter().filter(|(_, c)| **c == max_count);
    match (modes.next(), modes.next()) {
        (Some((answer, _)), None) => Some(*answer),
        _ => None,
    }
}

fn resolve_item(
    item_id: &str,
    mut entries: Vec<EvidenceEntry>,
    rules: &ResolutionRules,
) -> Result<ConsensusResult, ReliabilityErrors> {
    let n_raters = entries.len() as u64;
    if let Some(mode) = unique_mode(&entries) {
        debug!("resolve_item: {}: mode {:?}", item_id, mode);
        return Ok(ConsensusResult {
            item_id: item_id.to_string(),
            resolved_answer: mode.to_string(),
            state: ResolutionState::ModeClear,
            is_conflicted: false,
            is_unknown_flagged: mode == rules.unknown_answer,
            n_raters,
            top_rater: None,
            top_two_ratio: Statistic::NotApplicable,
            avg_rater_rank: Statistic::NotApplicable,
            evidence: Vec::new(),
            next_best: None,
        });
    }

    // A tie needs at least two distinct answers, so there are at least two entries here.
    entries.sort_by(evidence_order);
    let top = entries.first().ok_or_else(|| {
        ReliabilityErrors::MalformedInput(format!("item {} has no rater", item_id))
    })?;
    let resolved_answer = top.answer.clone();
    let top_rater = top.rater_id.clone();
    let top_two_ratio = match entries.as_slice() {
        [first, second, ..] => Statistic::ratio(first.reliability_score, second.reliability_score),
        _ => Statistic::Undefined,
    };
    let avg_rater_rank = Statistic::ratio(
        entries.iter().map(|e| e.rank).sum::<f64>(),
        entries.len() as f64,
    );

    let (state, next_best) = if resolved_answer == rules.unknown_answer {
        let answers: Vec<&str> = entries.iter().map(|e| e.answer.as_str()).collect();
        let ranks: Vec<f64> = entries.iter().map(|e| e.rank).collect();
        let next = find_next_acceptable(
            &answers,
            &ranks,
            &rules.acceptable_answers,
            rules.rank_ceiling,
        )?;
        let state = if next.could_not_find {
            ResolutionState::TiedWithUnknownUnresolvable
        } else {
            ResolutionState::TiedWithUnknown
        };
        (state, Some(next))
    } else {
        (ResolutionState::TiedNoUnknown, None)
    };
    debug!(
        "resolve_item: {}: conflict resolved by {} to {:?} ({:?}), top two ratio {:?}",
        item_id, top_rater, resolved_answer, state, top_two_ratio
    );

    Ok(ConsensusResult {
        item_id: item_id.to_string(),
        is_unknown_flagged: resolved_answer == rules.unknown_answer,
        resolved_answer,
        state,
        is_conflicted: true,
        n_raters,
        top_rater: Some(top_rater),
        top_two_ratio,
        avg_rater_rank,
        evidence: entries,
        next_best,
    })
}

fn is_retired(policy: RetirementPolicy, flagged: bool, n_raters: u64) -> bool {
    match policy {
        RetirementPolicy::AllItems => true,
        RetirementPolicy::Flagged => flagged,
        RetirementPolicy::MinimumRaters(m) => n_raters >= m as u64,
        RetirementPolicy::FlaggedOrMinimumRaters(m) => flagged || n_raters >= m as u64,
    }
}

fn check_standings(standings: &[RaterStanding]) -> Result<(), ReliabilityErrors> {
    let mut seen: HashSet<&str> = HashSet::new();
    for s in standings.iter() {
        if !seen.insert(s.rater_id.as_str()) {
            return Err(ReliabilityErrors::MalformedInput(format!(
                "rater {:?} appears more than once in the reliability table",
                s.rater_id
            )));
        }
        if !s.reliability_score.is_finite() || !s.rank.is_finite() {
            return Err(ReliabilityErrors::MalformedInput(format!(
                "rater {:?} has a non-finite score or rank",
                s.rater_id
            )));
        }
    }
    Ok(())
}

/// Resolves every eligible item to a single answer.
///
/// Arguments:
/// * `records` the raw classifications. Only the latest classification of each rater on
/// an item is used.
/// * `standings` the reliability table. Raters missing from this table are excluded
/// from the resolution.
/// * `rules` the resolution rules.
pub fn resolve_consensus(
    records: &[ClassificationRecord],
    standings: &[RaterStanding],
    rules: &ResolutionRules,
) -> Result<ConsensusOutcome, ReliabilityErrors> {
    info!(
        "Resolving {} classifications with {} rated raters, rules: {:?}",
        records.len(),
        standings.len(),
        rules
    );
    rules.check()?;
    check_domain(records, &rules.answer_domain)?;
    check_standings(standings)?;

    let by_rater: HashMap<&str, &RaterStanding> = standings
        .iter()
        .map(|s| (s.rater_id.as_str(), s))
        .collect();

    let flagged_items: HashSet<&str> = records
        .iter()
        .filter(|r| r.retired == Some(true))
        .map(|r| r.item_id.as_str())
        .collect();

    let dedup = deduplicate_latest(records);
    let mut by_item: BTreeMap<&str, Vec<&ClassificationRecord>> = BTreeMap::new();
    for r in dedup.iter() {
        by_item.entry(r.item_id.as_str()).or_default().push(r);
    }

    let excluded_raters: BTreeSet<&str> = dedup
        .iter()
        .map(|r| r.rater_id.as_str())
        .filter(|rater| !by_rater.contains_key(rater))
        .collect();
    for rater in excluded_raters.iter() {
        warn!(
            "Rater {:?} has no reliability score: excluded from the resolution",
            rater
        );
    }

    let items: Vec<(&str, Vec<&ClassificationRecord>)> = by_item.into_iter().collect();
    let outcomes: Vec<ItemOutcome> = items
        .par_iter()
        .map(|(item_id, item_records)| {
            let n_raters = item_records.len() as u64;
            let flagged = flagged_items.contains(item_id);
            if !is_retired(rules.retirement, flagged, n_raters) {
                return Ok(ItemOutcome::Excluded(ItemExclusion {
                    item_id: item_id.to_string(),
                    reason: ItemExclusionReason::NotRetired { n_raters },
                }));
            }
            let entries: Vec<EvidenceEntry> = item_records
                .iter()
                .filter_map(|r| {
                    by_rater.get(r.rater_id.as_str()).map(|s| EvidenceEntry {
                        rater_id: r.rater_id.clone(),
                        answer: r.answer.clone(),
                        rank: s.rank,
                        reliability_score: s.reliability_score,
                    })
                })
                .collect();
            if entries.is_empty() {
                return Ok(ItemOutcome::Excluded(ItemExclusion {
                    item_id: item_id.to_string(),
                    reason: ItemExclusionReason::NoScoredRaters,
                }));
            }
            resolve_item(item_id, entries, rules).map(ItemOutcome::Resolved)
        })
        .collect::<Result<Vec<ItemOutcome>, ReliabilityErrors>>()?;

    let mut results: Vec<ConsensusResult> = Vec::new();
    let mut excluded_items: Vec<ItemExclusion> = Vec::new();
    for o in outcomes {
        match o {
            ItemOutcome::Resolved(r) => results.push(r),
            ItemOutcome::Excluded(e) => {
                debug!("resolve_consensus: excluded item {:?}", e);
                excluded_items.push(e);
            }
        }
    }
    info!(
        "Resolved {} items ({} conflicts), excluded {} items and {} raters",
        results.len(),
        results.iter().filter(|r| r.is_conflicted).count(),
        excluded_items.len(),
        excluded_raters.len()
    );

    Ok(ConsensusOutcome {
        results,
        excluded_items,
        excluded_raters: excluded_raters.iter().map(|s| s.to_string()).collect(),
    })
}

/// The conflicts that most need a human review: conflicted items whose top answer is the
/// unknown answer, by increasing ratio between the two best raters (raters of similar
/// reliability first). Undefined ratios come last.
pub fn review_queue(results: &[ConsensusResult]) -> Vec<&ConsensusResult> {
    let mut queue: Vec<&ConsensusResult> = results
        .iter()
        .filter(|r| r.is_conflicted && r.is_unknown_flagged)
        .collect();
    queue.sort_by(|x, y| {
        let ord = match (x.top_two_ratio.value(), y.top_two_ratio.value()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        ord.then_with(|| x.item_id.cmp(&y.item_id))
    });
    queue
}
