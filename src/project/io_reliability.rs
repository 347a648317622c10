// Reads back a reliability table written by a previous run.

use crate::project::{output::ReliabilityRow, *};

pub fn read_reliability_table(path: String) -> BRelResult<Vec<RaterStanding>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(&path)
        .context(CsvOpenSnafu { path: path.clone() })?;
    let mut res: Vec<RaterStanding> = Vec::new();
    for (idx, line_r) in rdr.deserialize::<ReliabilityRow>().enumerate() {
        let lineno = idx + 2;
        let row = line_r.context(CsvLineParseSnafu {})?;
        match (row.reliability_score, row.rank) {
            (Some(reliability_score), Some(rank)) => res.push(RaterStanding {
                rater_id: row.rater_id,
                reliability_score,
                rank,
            }),
            (None, _) => {
                info!(
                    "read_reliability_table: line {}: rater {:?} has no score and is skipped",
                    lineno, row.rater_id
                );
            }
            (Some(_), None) => MissingRankSnafu {
                lineno,
                rater: row.rater_id,
            }
            .fail()?,
        }
    }
    info!(
        "read_reliability_table: read {} scored raters from {:?}",
        res.len(),
        path
    );
    Ok(res)
}
