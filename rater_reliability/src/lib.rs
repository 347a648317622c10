mod config;
pub mod builder;
pub mod consensus;
pub mod manual;

use log::{debug, info, warn};
use rayon::prelude::*;

use std::collections::{BTreeMap, HashMap};

pub use crate::config::*;
pub use crate::consensus::{find_next_acceptable, resolve_consensus, review_queue};

// **** Private structures ****

// The latest answer of each rater, indexed by item.
type LatestAnswers<'a> = BTreeMap<&'a str, BTreeMap<&'a str, &'a str>>;

#[derive(PartialEq, Debug, Clone, Copy)]
struct PartnerKappa<'a> {
    partner: &'a str,
    kappa: Statistic,
}

/// Keeps, for each (rater, item), the most recent classification.
///
/// When two classifications share the same timestamp, the one that appears last in the input wins.
/// The output is sorted by rater, then item.
pub fn deduplicate_latest(records: &[ClassificationRecord]) -> Vec<ClassificationRecord> {
    let mut latest: BTreeMap<(&str, &str), &ClassificationRecord> = BTreeMap::new();
    for r in records.iter() {
        let key = (r.rater_id.as_str(), r.item_id.as_str());
        match latest.get(&key) {
            Some(prev) if prev.timestamp > r.timestamp => {}
            _ => {
                latest.insert(key, r);
            }
        }
    }
    debug!(
        "deduplicate_latest: {} records -> {} (rater, item) pairs",
        records.len(),
        latest.len()
    );
    latest.into_values().cloned().collect()
}

/// Cohen's kappa between two aligned answer vectors.
///
/// Observed and expected agreement are computed from exact counts, so the value is
/// the same whichever rater is passed first. The coefficient is undefined when the
/// expected agreement is 1 (both raters always gave the same single answer), or when
/// the vectors are empty.
pub fn cohen_kappa<S: AsRef<str>>(a: &[S], b: &[S]) -> Statistic {
    if a.len() != b.len() || a.is_empty() {
        return Statistic::Undefined;
    }
    let n = a.len() as u64;
    let mut agreements: u64 = 0;
    let mut marginals: HashMap<&str, (u64, u64)> = HashMap::new();
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y): (&str, &str) = (x.as_ref(), y.as_ref());
        if x == y {
            agreements += 1;
        }
        marginals.entry(x).or_insert((0, 0)).0 += 1;
        marginals.entry(y).or_insert((0, 0)).1 += 1;
    }
    // n^2 * expected agreement
    let chance: u64 = marginals.values().map(|(ca, cb)| ca * cb).sum();
    let n2 = n * n;
    if chance == n2 {
        return Statistic::Undefined;
    }
    // kappa = 1 - (1 - p_o) / (1 - p_e), scaled by n^2 on both sides.
    let disagreement = (n * (n - agreements)) as f64;
    Statistic::Defined(1.0 - disagreement / ((n2 - chance) as f64))
}

/// Ranks the scores in descending order. Equal scores receive the average of the
/// positions they would occupy (1-based).
pub fn average_ranks(scores: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&i, &j| {
        scores[j]
            .partial_cmp(&scores[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Positions start+1 ..= end
        let avg = (start + 1 + end) as f64 / 2.0;
        for idx in order[start..end].iter() {
            ranks[*idx] = avg;
        }
        start = end;
    }
    ranks
}

/// The ranks at or above this value are considered to be in the bottom tier.
fn bottom_tier_rank(num_raters: usize, bottom_tier_fraction: f64) -> f64 {
    let cutoff = num_raters as f64 * (1.0 - bottom_tier_fraction);
    // Absorb the representation error of the fraction (e.g. 10 * 0.8).
    (cutoff - 1e-9).ceil()
}

/// Mean agreement coefficient weighted by the log of the number of classifications.
fn reliability_score(mean_kappa: f64, n_classifications: u64) -> f64 {
    // ln(1) = 0, and the product would carry the sign of the mean (-0.0).
    if n_classifications <= 1 {
        return 0.0;
    }
    mean_kappa * (n_classifications as f64).ln()
}

fn latest_answers(records: &[ClassificationRecord]) -> LatestAnswers<'_> {
    let mut res: LatestAnswers = BTreeMap::new();
    for r in records.iter() {
        res.entry(r.rater_id.as_str())
            .or_default()
            .insert(r.item_id.as_str(), r.answer.as_str());
    }
    res
}

fn compare_pair(
    rater_a: &str,
    seen_a: &BTreeMap<&str, &str>,
    rater_b: &str,
    seen_b: &BTreeMap<&str, &str>,
) -> Option<RaterPairAgreement> {
    let common: Vec<(&str, &str, &str)> = seen_a
        .iter()
        .filter_map(|(item, ans_a)| seen_b.get(item).map(|ans_b| (*item, *ans_a, *ans_b)))
        .collect();
    if common.is_empty() {
        return None;
    }
    let vec_a: Vec<&str> = common.iter().map(|(_, x, _)| *x).collect();
    let vec_b: Vec<&str> = common.iter().map(|(_, _, y)| *y).collect();
    let kappa = cohen_kappa(&vec_a, &vec_b);

    let n_common = common.len() as u64;
    let n_agreements = common.iter().filter(|(_, x, y)| x == y).count() as u64;
    let n_disagreements = n_common - n_agreements;
    let (perc_agreements, perc_disagreements, agree_disagree_ratio) = if kappa.is_defined() {
        (
            Statistic::ratio(n_agreements as f64, n_common as f64),
            Statistic::ratio(n_disagreements as f64, n_common as f64),
            Statistic::ratio(n_agreements as f64, n_disagreements as f64),
        )
    } else {
        (
            Statistic::NotApplicable,
            Statistic::NotApplicable,
            Statistic::NotApplicable,
        )
    };
    debug!(
        "compare_pair: {} / {}: {} in common, kappa {:?}",
        rater_a, rater_b, n_common, kappa
    );

    Some(RaterPairAgreement {
        rater_a: rater_a.to_string(),
        rater_b: rater_b.to_string(),
        items_in_common: common.iter().map(|(item, _, _)| item.to_string()).collect(),
        agreement_coefficient: kappa,
        n_agreements,
        n_disagreements,
        perc_agreements,
        perc_disagreements,
        agree_disagree_ratio,
    })
}

/// Computes the reliability score of every rater.
///
/// Arguments:
/// * `records` the raw classifications. Repeated views of an item by the same rater are allowed,
/// only the most recent one is used.
/// * `rules` the rules for flagging the low-reliability raters.
///
/// Raters that cannot be scored are reported in the exclusions of the result.
pub fn run_reliability_scores(
    records: &[ClassificationRecord],
    rules: &ScoringRules,
) -> Result<ReliabilityResult, ReliabilityErrors> {
    info!(
        "Processing {:?} classifications, rules: {:?}",
        records.len(),
        rules
    );
    rules.check()?;
    check_domain(records, &rules.answer_domain)?;

    let dedup = deduplicate_latest(records);
    let seen = latest_answers(&dedup);
    let raters: Vec<(&str, &BTreeMap<&str, &str>)> =
        seen.iter().map(|(r, items)| (*r, items)).collect();
    info!(
        "Processing {} raters and {} distinct classifications",
        raters.len(),
        dedup.len()
    );

    let pair_indexes: Vec<(usize, usize)> = (0..raters.len())
        .flat_map(|i| ((i + 1)..raters.len()).map(move |j| (i, j)))
        .collect();
    // collect() keeps the (i, j) order.
    let pairs: Vec<RaterPairAgreement> = pair_indexes
        .par_iter()
        .filter_map(|&(i, j)| compare_pair(raters[i].0, raters[i].1, raters[j].0, raters[j].1))
        .collect();
    debug!("run_reliability_scores: {} pairs with items in common", pairs.len());

    // The partners of each rater, in rater order (see the ordering of the pairs).
    let mut partners: HashMap<&str, Vec<PartnerKappa>> = HashMap::new();
    let mut shared: HashMap<&str, u64> = HashMap::new();
    for p in pairs.iter() {
        let n_common = p.items_in_common.len() as u64;
        *shared.entry(p.rater_a.as_str()).or_default() += n_common;
        *shared.entry(p.rater_b.as_str()).or_default() += n_common;
        partners.entry(p.rater_a.as_str()).or_default().push(PartnerKappa {
            partner: p.rater_b.as_str(),
            kappa: p.agreement_coefficient,
        });
        partners.entry(p.rater_b.as_str()).or_default().push(PartnerKappa {
            partner: p.rater_a.as_str(),
            kappa: p.agreement_coefficient,
        });
    }
    for l in partners.values_mut() {
        l.sort_by(|x, y| x.partner.cmp(y.partner));
    }

    let mut overlaps: Vec<RaterOverlap> = Vec::new();
    let mut exclusions: Vec<RaterExclusion> = Vec::new();
    // (rater, mean kappa, number of classifications)
    let mut scored: Vec<(&str, f64, u64)> = Vec::new();
    for (rater, items) in raters.iter() {
        let n_classifications = items.len() as u64;
        let rater_partners = partners.get(rater).cloned().unwrap_or_default();
        let n_shared_items = shared.get(rater).copied().unwrap_or(0);
        overlaps.push(RaterOverlap {
            rater_id: rater.to_string(),
            n_partners: rater_partners.len() as u64,
            n_shared_items,
        });

        let kappas: Vec<f64> = rater_partners
            .iter()
            .filter_map(|pk| pk.kappa.value())
            .collect();
        if kappas.is_empty() {
            let reason = if rater_partners.is_empty() {
                ExclusionReason::NoSharedItems
            } else {
                ExclusionReason::NoDefinedAgreement
            };
            warn!(
                "Rater {:?} ({} classifications) cannot be scored: {:?}",
                rater, n_classifications, reason
            );
            exclusions.push(RaterExclusion {
                rater_id: rater.to_string(),
                n_classifications,
                reason,
            });
            continue;
        }
        let mean_kappa = kappas.iter().sum::<f64>() / kappas.len() as f64;
        scored.push((*rater, mean_kappa, n_classifications));
    }

    let reliability: Vec<f64> = scored
        .iter()
        .map(|(_, mean_kappa, n)| reliability_score(*mean_kappa, *n))
        .collect();
    let ranks = average_ranks(&reliability);
    let tier_rank = bottom_tier_rank(scored.len(), rules.bottom_tier_fraction);
    debug!(
        "run_reliability_scores: {} scored raters, bottom tier from rank {}",
        scored.len(),
        tier_rank
    );

    let mut scores: Vec<ReliabilityScore> = scored
        .iter()
        .zip(reliability.iter().zip(ranks.iter()))
        .map(|((rater, mean_kappa, n), (score, rank))| ReliabilityScore {
            rater_id: rater.to_string(),
            mean_agreement_coefficient: *mean_kappa,
            n_classifications: *n,
            reliability_score: *score,
            rank: *rank,
            is_bottom_tier: *rank >= tier_rank,
        })
        .collect();
    scores.sort_by(|x, y| {
        x.rank
            .partial_cmp(&y.rank)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| x.rater_id.cmp(&y.rater_id))
    });
    for s in scores.iter() {
        info!(
            "Rank {}: {} score {:.4} (kappa {:.4}, {} classifications){}",
            s.rank,
            s.rater_id,
            s.reliability_score,
            s.mean_agreement_coefficient,
            s.n_classifications,
            if s.is_bottom_tier { " -> bottom tier" } else { "" }
        );
    }

    Ok(ReliabilityResult {
        scores,
        pairs,
        exclusions,
        overlaps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub(crate) fn rec(rater: &str, item: &str, answer: &str, minute: u32) -> ClassificationRecord {
        ClassificationRecord {
            rater_id: rater.to_string(),
            item_id: item.to_string(),
            answer: answer.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2017, 11, 26)
                .and_then(|d| d.and_hms_opt(10, minute, 0))
                .unwrap(),
            retired: None,
        }
    }

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn run(records: &[ClassificationRecord]) -> ReliabilityResult {
        run_reliability_scores(records, &ScoringRules::DEFAULT_RULES).unwrap()
    }

    #[test]
    fn kappa_perfect_agreement() {
        let a = ["Yes", "No", "Yes", "No"];
        assert_eq!(cohen_kappa(&a, &a), Statistic::Defined(1.0));
    }

    #[test]
    fn kappa_known_value() {
        // p_o = 0.5, p_e = 0.5 -> 0
        let a = ["Yes", "Yes", "No", "No"];
        let b = ["Yes", "No", "Yes", "No"];
        assert_eq!(cohen_kappa(&a, &b), Statistic::Defined(0.0));
        // p_o = 0.75, p_e = 0.5 -> 0.5
        let c = ["Yes", "Yes", "No", "Yes"];
        let d = ["Yes", "Yes", "No", "No"];
        assert_eq!(cohen_kappa(&c, &d), Statistic::Defined(0.5));
    }

    #[test]
    fn kappa_is_symmetric() {
        let a = ["Yes", "No", "IDK", "Yes", "No", "No"];
        let b = ["No", "No", "Yes", "Yes", "IDK", "No"];
        assert_eq!(cohen_kappa(&a, &b), cohen_kappa(&b, &a));
    }

    #[test]
    fn kappa_undefined_when_agreement_is_pure_chance() {
        let a = ["Yes", "Yes", "Yes"];
        assert_eq!(cohen_kappa(&a, &a), Statistic::Undefined);
        let empty: [&str; 0] = [];
        assert_eq!(cohen_kappa(&empty, &empty), Statistic::Undefined);
    }

    #[test]
    fn kappa_zero_for_constant_rater() {
        let troll = ["No", "No", "No", "No"];
        let other = ["Yes", "No", "Yes", "No"];
        assert_eq!(cohen_kappa(&troll, &other), Statistic::Defined(0.0));
    }

    #[test]
    fn deduplicate_keeps_latest() {
        let records = vec![
            rec("A", "X", "No", 5),
            rec("A", "X", "Yes", 10),
            rec("A", "X", "IDK", 1),
            rec("B", "X", "No", 2),
        ];
        let dedup = deduplicate_latest(&records);
        assert_eq!(dedup.len(), 2);
        assert_eq!(dedup[0].answer, "Yes");
        assert_eq!(dedup[1].rater_id, "B");
    }

    #[test]
    fn deduplicate_same_timestamp_last_wins() {
        let records = vec![rec("A", "X", "No", 5), rec("A", "X", "Yes", 5)];
        assert_eq!(deduplicate_latest(&records)[0].answer, "Yes");
    }

    #[test]
    fn average_ranks_with_ties() {
        assert_eq!(average_ranks(&[3.0, 1.0, 2.0]), vec![1.0, 3.0, 2.0]);
        assert_eq!(
            average_ranks(&[5.0, 2.0, 5.0, 1.0]),
            vec![1.5, 3.0, 1.5, 4.0]
        );
        assert_eq!(average_ranks(&[0.0, 0.0, 0.0]), vec![2.0, 2.0, 2.0]);
        assert!(average_ranks(&[]).is_empty());
    }

    #[test]
    fn bottom_tier_boundary() {
        assert_eq!(bottom_tier_rank(10, 0.2), 8.0);
        assert_eq!(bottom_tier_rank(5, 0.2), 4.0);
        assert_eq!(bottom_tier_rank(3, 0.2), 3.0);
        assert_eq!(bottom_tier_rank(1, 0.2), 1.0);
        assert_eq!(bottom_tier_rank(4, 0.0), 4.0);
    }

    #[test]
    fn single_classification_score_is_positive_zero() {
        let score = reliability_score(-0.5, 1);
        assert_eq!(score, 0.0);
        assert!(score.is_sign_positive());
        assert_eq!(format!("{:.6}", score), "0.000000");
        assert_eq!(reliability_score(0.5, 1), 0.0);
        assert!((reliability_score(-0.5, 4) + 0.5 * 4f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn empty_input() {
        let res = run(&[]);
        assert!(res.scores.is_empty());
        assert!(res.pairs.is_empty());
        assert!(res.exclusions.is_empty());
    }

    fn three_raters() -> Vec<ClassificationRecord> {
        vec![
            rec("A", "1", "Yes", 0),
            rec("A", "2", "No", 0),
            rec("A", "3", "Yes", 0),
            rec("A", "4", "No", 0),
            rec("B", "1", "Yes", 1),
            rec("B", "2", "No", 1),
            rec("B", "3", "No", 1),
            rec("B", "4", "No", 1),
            rec("C", "1", "No", 2),
            rec("C", "2", "Yes", 2),
            rec("C", "3", "Yes", 2),
        ]
    }

    #[test]
    fn pairs_are_scored_once() {
        let res = run(&three_raters());
        let keys: Vec<(String, String)> = res
            .pairs
            .iter()
            .map(|p| (p.rater_a.clone(), p.rater_b.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A".to_string(), "B".to_string()),
                ("A".to_string(), "C".to_string()),
                ("B".to_string(), "C".to_string()),
            ]
        );
        let ab = &res.pairs[0];
        assert_eq!(ab.items_in_common, vec!["1", "2", "3", "4"]);
        assert_eq!(ab.n_agreements, 3);
        assert_eq!(ab.n_disagreements, 1);
        assert_eq!(ab.perc_agreements, Statistic::Defined(0.75));
        assert_eq!(ab.agree_disagree_ratio, Statistic::Defined(3.0));
        // A: Y N Y N, B: Y N N N -> p_o = 0.75, p_e = (2*1 + 2*3) / 16 = 0.5
        assert_eq!(ab.agreement_coefficient, Statistic::Defined(0.5));
    }

    #[test]
    fn reliability_is_mean_kappa_times_log_count() {
        let res = run(&three_raters());
        assert_eq!(res.scores.len(), 3);
        for s in res.scores.iter() {
            let kappas: Vec<f64> = res
                .pairs
                .iter()
                .filter(|p| p.involves(&s.rater_id))
                .filter_map(|p| p.agreement_coefficient.value())
                .collect();
            let mean = kappas.iter().sum::<f64>() / kappas.len() as f64;
            assert!((s.mean_agreement_coefficient - mean).abs() < 1e-12);
            let expected = mean * (s.n_classifications as f64).ln();
            assert!((s.reliability_score - expected).abs() < 1e-12);
        }
        let ranks: Vec<f64> = res.scores.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1.0, 2.0, 3.0]);
        assert_eq!(res.scores[0].rater_id, "A");
    }

    #[test]
    fn undefined_kappa_excluded_from_mean() {
        // A and B both always say Yes on their common items: undefined kappa.
        // A and C have a defined kappa.
        let records = vec![
            rec("A", "1", "Yes", 0),
            rec("A", "2", "Yes", 0),
            rec("A", "3", "No", 0),
            rec("B", "1", "Yes", 0),
            rec("B", "2", "Yes", 0),
            rec("C", "2", "Yes", 0),
            rec("C", "3", "No", 0),
        ];
        let res = run(&records);
        let ab = res
            .pairs
            .iter()
            .find(|p| p.rater_a == "A" && p.rater_b == "B")
            .unwrap();
        assert_eq!(ab.agreement_coefficient, Statistic::Undefined);
        assert_eq!(ab.agree_disagree_ratio, Statistic::NotApplicable);

        let a = res.scores.iter().find(|s| s.rater_id == "A").unwrap();
        // Only the kappa with C (perfect agreement) counts.
        assert_eq!(a.mean_agreement_coefficient, 1.0);

        // B only has an undefined coefficient.
        assert!(res.scores.iter().all(|s| s.rater_id != "B"));
        assert_eq!(
            res.exclusions,
            vec![RaterExclusion {
                rater_id: "B".to_string(),
                n_classifications: 2,
                reason: ExclusionReason::NoDefinedAgreement,
            }]
        );
    }

    #[test]
    fn isolated_rater_is_reported() {
        let mut records = three_raters();
        records.push(rec("Z", "99", "Yes", 0));
        let res = run(&records);
        assert!(res.scores.iter().all(|s| s.rater_id != "Z"));
        assert_eq!(res.exclusions.len(), 1);
        assert_eq!(res.exclusions[0].reason, ExclusionReason::NoSharedItems);
        let z = res.overlaps.iter().find(|o| o.rater_id == "Z").unwrap();
        assert_eq!(z.n_partners, 0);
        assert_eq!(z.n_shared_items, 0);
        let a = res.overlaps.iter().find(|o| o.rater_id == "A").unwrap();
        assert_eq!(a.n_partners, 2);
        assert_eq!(a.n_shared_items, 7);
    }

    #[test]
    fn single_classification_scores_zero() {
        let records = vec![
            rec("A", "1", "Yes", 0),
            rec("A", "2", "No", 0),
            rec("B", "1", "Yes", 0),
            rec("B", "2", "No", 0),
            rec("C", "1", "No", 0),
        ];
        let res = run(&records);
        // C agrees with no one, but only has a single classification.
        // C vs A on item 1: constant vectors with different answers -> kappa 0.
        let c = res.scores.iter().find(|s| s.rater_id == "C").unwrap();
        assert_eq!(c.n_classifications, 1);
        assert_eq!(c.reliability_score, 0.0);
        assert!(c.reliability_score.is_sign_positive());
    }

    #[test]
    fn bottom_tier_flags() {
        init();
        // Five raters with distinct scores: ranks 4 and 5 are flagged.
        let answers = [
            ("A", ["Yes", "No", "Yes", "No", "Yes", "No"]),
            ("B", ["Yes", "No", "Yes", "No", "Yes", "Yes"]),
            ("C", ["Yes", "No", "Yes", "Yes", "No", "Yes"]),
            ("D", ["No", "No", "Yes", "Yes", "No", "Yes"]),
            ("E", ["No", "Yes", "No", "Yes", "No", "Yes"]),
        ];
        let mut records = Vec::new();
        for (rater, ans) in answers.iter() {
            for (idx, a) in ans.iter().enumerate() {
                records.push(rec(rater, &idx.to_string(), a, 0));
            }
        }
        let res = run(&records);
        assert_eq!(res.scores.len(), 5);
        for s in res.scores.iter() {
            assert_eq!(s.is_bottom_tier, s.rank >= 4.0, "{:?}", s);
        }
        assert_eq!(res.scores.iter().filter(|s| s.is_bottom_tier).count(), 2);
    }

    /// Six classifications per core rater, plus S and T who only answered item 0
    /// with an answer nobody else gave. S and T both score exactly 0.
    fn with_two_single_raters(core: &[(&str, [&str; 6])]) -> Vec<ClassificationRecord> {
        let mut records = Vec::new();
        for (rater, ans) in core.iter() {
            for (idx, a) in ans.iter().enumerate() {
                records.push(rec(rater, &idx.to_string(), a, 0));
            }
        }
        records.push(rec("S", "0", "Maybe", 0));
        records.push(rec("T", "0", "Maybe", 0));
        records
    }

    fn rank_and_tier(res: &ReliabilityResult, rater: &str) -> (f64, bool) {
        let s = res.scores.iter().find(|s| s.rater_id == rater).unwrap();
        (s.rank, s.is_bottom_tier)
    }

    #[test]
    fn tie_just_above_the_bottom_tier() {
        init();
        // Six positive scores, S and T tied at positions 7-8, two negative scores.
        let core = [
            ("A", ["Yes", "Yes", "No", "Yes", "Yes", "Yes"]),
            ("B", ["No", "Yes", "No", "No", "No", "No"]),
            ("C", ["Yes", "Yes", "No", "No", "No", "No"]),
            ("D", ["No", "Yes", "Yes", "Yes", "No", "No"]),
            ("E", ["No", "Yes", "Yes", "Yes", "No", "Yes"]),
            ("F", ["Yes", "No", "Yes", "No", "No", "Yes"]),
            ("G", ["No", "Yes", "No", "Yes", "Yes", "Yes"]),
            ("H", ["No", "Yes", "Yes", "No", "No", "Yes"]),
        ];
        let res = run(&with_two_single_raters(&core));
        assert_eq!(res.scores.len(), 10);
        // Cutoff: ceil(10 * 0.8) = 8
        assert_eq!(rank_and_tier(&res, "S"), (7.5, false));
        assert_eq!(rank_and_tier(&res, "T"), (7.5, false));
        assert_eq!(rank_and_tier(&res, "G"), (6.0, false));
        assert_eq!(rank_and_tier(&res, "A"), (9.0, true));
        assert_eq!(rank_and_tier(&res, "F"), (10.0, true));
        assert_eq!(res.scores.iter().filter(|s| s.is_bottom_tier).count(), 2);
    }

    #[test]
    fn tie_straddling_the_bottom_tier() {
        init();
        // Seven positive scores, S and T tied at positions 8-9, one negative score.
        let core = [
            ("A", ["Yes", "No", "Yes", "Yes", "No", "No"]),
            ("B", ["No", "Yes", "Yes", "Yes", "Yes", "Yes"]),
            ("C", ["Yes", "Yes", "Yes", "No", "Yes", "Yes"]),
            ("D", ["No", "No", "No", "Yes", "No", "Yes"]),
            ("E", ["No", "Yes", "No", "Yes", "No", "No"]),
            ("F", ["No", "No", "No", "Yes", "Yes", "No"]),
            ("G", ["No", "Yes", "Yes", "Yes", "No", "No"]),
            ("H", ["Yes", "No", "Yes", "Yes", "No", "Yes"]),
        ];
        let res = run(&with_two_single_raters(&core));
        assert_eq!(res.scores.len(), 10);
        assert_eq!(rank_and_tier(&res, "B"), (7.0, false));
        assert_eq!(rank_and_tier(&res, "S"), (8.5, true));
        assert_eq!(rank_and_tier(&res, "T"), (8.5, true));
        assert_eq!(rank_and_tier(&res, "C"), (10.0, true));
        assert_eq!(res.scores.iter().filter(|s| s.is_bottom_tier).count(), 3);
    }

    #[test]
    fn overlaps_with_many_raters() {
        // 300 raters with two classifications each over 20 items.
        let mut records = Vec::new();
        for i in 0..300u32 {
            let rater = format!("r{:03}", i);
            let answer = if i % 3 == 0 { "No" } else { "Yes" };
            records.push(rec(&rater, &(i % 20).to_string(), answer, 0));
            records.push(rec(&rater, &((i * 7 + 3) % 20).to_string(), "Yes", 1));
        }
        let res = run(&records);
        assert_eq!(res.overlaps.len(), 300);
        for o in res.overlaps.iter() {
            let involved: Vec<&RaterPairAgreement> =
                res.pairs.iter().filter(|p| p.involves(&o.rater_id)).collect();
            assert_eq!(o.n_partners, involved.len() as u64, "{:?}", o);
            let shared: u64 = involved.iter().map(|p| p.items_in_common.len() as u64).sum();
            assert_eq!(o.n_shared_items, shared, "{:?}", o);
        }
        let total_shared: u64 = res.overlaps.iter().map(|o| o.n_shared_items).sum();
        let total_common: u64 = res
            .pairs
            .iter()
            .map(|p| p.items_in_common.len() as u64)
            .sum();
        assert_eq!(total_shared, 2 * total_common);
    }

    #[test]
    fn deterministic() {
        let records = three_raters();
        assert_eq!(run(&records), run(&records));
        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(run(&records).scores, run(&reversed).scores);
    }

    #[test]
    fn answer_domain_is_enforced() {
        let rules = ScoringRules {
            bottom_tier_fraction: 0.2,
            answer_domain: Some(vec!["Yes".to_string(), "No".to_string()]),
        };
        let records = vec![rec("A", "1", "Maybe", 0)];
        let err = run_reliability_scores(&records, &rules).unwrap_err();
        assert!(matches!(err, ReliabilityErrors::AnswerOutsideDomain { .. }));
    }

    #[test]
    fn invalid_fraction() {
        let rules = ScoringRules {
            bottom_tier_fraction: 1.5,
            answer_domain: None,
        };
        assert!(matches!(
            run_reliability_scores(&[], &rules),
            Err(ReliabilityErrors::InvalidRules(_))
        ));
    }
}
