// The JSON summary and the CSV tables.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::project::*;

/// Statistics are written with a fixed precision so that summaries can be compared.
fn stat_to_json(s: &Statistic) -> JSValue {
    match s {
        Statistic::Defined(x) => json!(format!("{:.6}", x)),
        Statistic::Undefined => json!("undefined"),
        Statistic::NotApplicable => JSValue::Null,
    }
}

fn stat_to_csv(s: &Statistic) -> Option<f64> {
    s.value()
}

fn state_name(state: ResolutionState) -> &'static str {
    match state {
        ResolutionState::ModeClear => "modeClear",
        ResolutionState::TiedNoUnknown => "tiedNoUnknown",
        ResolutionState::TiedWithUnknown => "tiedWithUnknown",
        ResolutionState::TiedWithUnknownUnresolvable => "tiedWithUnknownUnresolvable",
    }
}

fn reliability_to_json(rr: &ReliabilityResult) -> Vec<JSValue> {
    rr.scores
        .iter()
        .map(|s| {
            json!({
                "rater": s.rater_id,
                "rank": s.rank.to_string(),
                "reliabilityScore": format!("{:.6}", s.reliability_score),
                "meanAgreement": format!("{:.6}", s.mean_agreement_coefficient),
                "classifications": s.n_classifications.to_string(),
                "bottomTier": s.is_bottom_tier,
            })
        })
        .collect()
}

fn standings_to_json(standings: &[RaterStanding]) -> Vec<JSValue> {
    standings
        .iter()
        .map(|s| {
            json!({
                "rater": s.rater_id,
                "rank": s.rank.to_string(),
                "reliabilityScore": format!("{:.6}", s.reliability_score),
            })
        })
        .collect()
}

fn excluded_raters_to_json(rr: &ReliabilityResult) -> Vec<JSValue> {
    rr.exclusions
        .iter()
        .map(|e| {
            let reason = match e.reason {
                ExclusionReason::NoSharedItems => "noSharedItems",
                ExclusionReason::NoDefinedAgreement => "noDefinedAgreement",
            };
            json!({
                "rater": e.rater_id,
                "classifications": e.n_classifications.to_string(),
                "reason": reason,
            })
        })
        .collect()
}

fn overlaps_to_json(rr: &ReliabilityResult) -> Vec<JSValue> {
    rr.overlaps
        .iter()
        .map(|o| {
            json!({
                "rater": o.rater_id,
                "partners": o.n_partners.to_string(),
                "sharedItems": o.n_shared_items.to_string(),
            })
        })
        .collect()
}

fn consensus_to_json(cr: &ConsensusResult) -> JSValue {
    let mut js = json!({
        "item": cr.item_id,
        "answer": cr.resolved_answer,
        "state": state_name(cr.state),
        "conflicted": cr.is_conflicted,
        "unknown": cr.is_unknown_flagged,
        "raters": cr.n_raters.to_string(),
    });
    if cr.is_conflicted {
        let evidence: Vec<JSValue> = cr
            .evidence
            .iter()
            .map(|e| json!({"rater": e.rater_id, "answer": e.answer, "rank": e.rank.to_string()}))
            .collect();
        js["topRater"] = json!(cr.top_rater);
        js["topTwoRatio"] = stat_to_json(&cr.top_two_ratio);
        js["avgRaterRank"] = stat_to_json(&cr.avg_rater_rank);
        js["evidence"] = JSValue::Array(evidence);
    }
    if let Some(nb) = &cr.next_best {
        js["nextBest"] = json!({
            "answer": nb.answer,
            "rank": nb.rank.map(|r| r.to_string()),
            "couldNotFind": nb.could_not_find,
        });
    }
    js
}

fn excluded_items_to_json(outcome: &ConsensusOutcome) -> Vec<JSValue> {
    outcome
        .excluded_items
        .iter()
        .map(|e| match e.reason {
            ItemExclusionReason::NotRetired { n_raters } => json!({
                "item": e.item_id,
                "reason": "notRetired",
                "raters": n_raters.to_string(),
            }),
            ItemExclusionReason::NoScoredRaters => json!({
                "item": e.item_id,
                "reason": "noScoredRaters",
            }),
        })
        .collect()
}

pub fn build_summary_js(
    config: &RelConfig,
    num_classifications: usize,
    reliability: Option<&ReliabilityResult>,
    standings: &[RaterStanding],
    outcome: &ConsensusOutcome,
) -> JSValue {
    let c = OutputConfig {
        project: config.output_settings.project_name.clone(),
        date: config.output_settings.project_date.clone(),
        classifications: num_classifications.to_string(),
    };
    let review: Vec<JSValue> = review_queue(&outcome.results)
        .iter()
        .map(|cr| json!(cr.item_id))
        .collect();
    let mut js = json!({
        "config": c,
        "consensus": outcome.results.iter().map(consensus_to_json).collect::<Vec<JSValue>>(),
        "excludedItems": excluded_items_to_json(outcome),
        "unscoredRaters": outcome.excluded_raters,
        "reviewQueue": review,
    });
    match reliability {
        Some(rr) => {
            js["reliability"] = JSValue::Array(reliability_to_json(rr));
            js["excludedRaters"] = JSValue::Array(excluded_raters_to_json(rr));
            js["overlaps"] = JSValue::Array(overlaps_to_json(rr));
        }
        None => {
            js["reliability"] = JSValue::Array(standings_to_json(standings));
        }
    }
    js
}

/// A row of the reliability table.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityRow {
    pub rater_id: String,
    pub reliability_score: Option<f64>,
    pub rank: Option<f64>,
    pub mean_agreement: Option<f64>,
    pub n_classifications: Option<u64>,
    pub bottom_tier: Option<bool>,
}

/// A row of the consensus table. The evidence columns hold JSON arrays.
#[derive(PartialEq, Debug, Clone, Serialize)]
struct ConsensusRow<'a> {
    item_id: &'a str,
    answer: &'a str,
    state: &'a str,
    conflicted: bool,
    unknown_flag: bool,
    n_raters: u64,
    top_rater: Option<&'a str>,
    top_two_ratio: Option<f64>,
    avg_rater_rank: Option<f64>,
    raters: String,
    answers: String,
    rater_ranks: String,
    next_best_answer: Option<&'a str>,
    next_best_rank: Option<f64>,
    next_best_index: Option<usize>,
    could_not_find: Option<bool>,
}

fn ensure_parent_dir(path: &str) -> BRelResult<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context(WritingOutputSnafu { path })?;
        }
    }
    Ok(())
}

pub fn write_reliability_csv(path: &str, rr: &ReliabilityResult) -> BRelResult<()> {
    info!("Writing reliability table to {:?}", path);
    ensure_parent_dir(path)?;
    let mut wtr = csv::Writer::from_path(path).context(WritingCsvSnafu { path })?;
    for s in rr.scores.iter() {
        let row = ReliabilityRow {
            rater_id: s.rater_id.clone(),
            reliability_score: Some(s.reliability_score),
            rank: Some(s.rank),
            mean_agreement: Some(s.mean_agreement_coefficient),
            n_classifications: Some(s.n_classifications),
            bottom_tier: Some(s.is_bottom_tier),
        };
        wtr.serialize(row).context(WritingCsvSnafu { path })?;
    }
    // Excluded raters are kept in the table, without a score.
    for e in rr.exclusions.iter() {
        let row = ReliabilityRow {
            rater_id: e.rater_id.clone(),
            reliability_score: None,
            rank: None,
            mean_agreement: None,
            n_classifications: Some(e.n_classifications),
            bottom_tier: None,
        };
        wtr.serialize(row).context(WritingCsvSnafu { path })?;
    }
    wtr.flush().context(WritingOutputSnafu { path })?;
    Ok(())
}

pub fn write_consensus_csv(path: &str, outcome: &ConsensusOutcome) -> BRelResult<()> {
    info!("Writing consensus table to {:?}", path);
    ensure_parent_dir(path)?;
    let mut wtr = csv::Writer::from_path(path).context(WritingCsvSnafu { path })?;
    for cr in outcome.results.iter() {
        let raters: Vec<&str> = cr.evidence.iter().map(|e| e.rater_id.as_str()).collect();
        let answers: Vec<&str> = cr.evidence.iter().map(|e| e.answer.as_str()).collect();
        let ranks: Vec<f64> = cr.evidence.iter().map(|e| e.rank).collect();
        let row = ConsensusRow {
            item_id: &cr.item_id,
            answer: &cr.resolved_answer,
            state: state_name(cr.state),
            conflicted: cr.is_conflicted,
            unknown_flag: cr.is_unknown_flagged,
            n_raters: cr.n_raters,
            top_rater: cr.top_rater.as_deref(),
            top_two_ratio: stat_to_csv(&cr.top_two_ratio),
            avg_rater_rank: stat_to_csv(&cr.avg_rater_rank),
            raters: serde_json::to_string(&raters).context(ParsingJsonSnafu {})?,
            answers: serde_json::to_string(&answers).context(ParsingJsonSnafu {})?,
            rater_ranks: serde_json::to_string(&ranks).context(ParsingJsonSnafu {})?,
            next_best_answer: cr.next_best.as_ref().and_then(|nb| nb.answer.as_deref()),
            next_best_rank: cr.next_best.as_ref().and_then(|nb| nb.rank),
            next_best_index: cr.next_best.as_ref().and_then(|nb| nb.index),
            could_not_find: cr.next_best.as_ref().map(|nb| nb.could_not_find),
        };
        wtr.serialize(row).context(WritingCsvSnafu { path })?;
    }
    wtr.flush().context(WritingOutputSnafu { path })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::io_reliability::read_reliability_table;
    use chrono::NaiveDate;
    use rater_reliability::builder::Builder;

    fn sample() -> ReliabilityResult {
        let t = NaiveDate::from_ymd_opt(2017, 11, 26)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        let mut builder = Builder::new();
        for (rater, item, answer) in [
            ("anna", "deed-1", "Yes"),
            ("anna", "deed-2", "No"),
            ("anna", "deed-3", "No"),
            ("bob", "deed-1", "Yes"),
            ("bob", "deed-2", "No"),
            ("bob", "deed-3", "Yes"),
            ("carla", "deed-1", "No"),
            ("carla", "deed-2", "No"),
            ("dmitri", "deed-9", "Yes"),
        ] {
            builder.add_classification(rater, item, answer, t).unwrap();
        }
        builder.reliability(&ScoringRules::DEFAULT_RULES).unwrap()
    }

    #[test]
    fn reliability_table_can_be_read_back() {
        let rr = sample();
        let path = std::env::temp_dir()
            .join(format!("raterel_test_{}", std::process::id()))
            .join("reliability.csv")
            .display()
            .to_string();
        write_reliability_csv(&path, &rr).unwrap();
        let standings = read_reliability_table(path.clone()).unwrap();
        // dmitri has no score and is not read back.
        assert_eq!(standings, rr.standings());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn summary_without_computed_scores() {
        let standings = vec![RaterStanding {
            rater_id: "anna".to_string(),
            reliability_score: 1.5,
            rank: 1.0,
        }];
        let outcome = ConsensusOutcome {
            results: vec![],
            excluded_items: vec![],
            excluded_raters: vec!["bob".to_string()],
        };
        let js = build_summary_js(&RelConfig::default(), 3, None, &standings, &outcome);
        assert_eq!(
            js["reliability"],
            json!([{"rater": "anna", "rank": "1", "reliabilityScore": "1.500000"}])
        );
        assert_eq!(js["unscoredRaters"], json!(["bob"]));
        assert!(js.get("overlaps").is_none());
    }

    #[test]
    fn statistics_in_json() {
        assert_eq!(stat_to_json(&Statistic::Defined(2.0 / 3.0)), json!("0.666667"));
        assert_eq!(stat_to_json(&Statistic::Undefined), json!("undefined"));
        assert_eq!(stat_to_json(&Statistic::NotApplicable), JSValue::Null);
    }
}
