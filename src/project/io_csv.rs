// Primitives for reading CSV files.

use crate::project::{io_common::simplify_file_name, *};

pub fn read_csv_classifications(
    path: String,
    cfs: &FileSource,
) -> BRelResult<Vec<ParsedClassification>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(&path)
        .context(CsvOpenSnafu { path: path.clone() })?;
    let header: Vec<String> = rdr
        .headers()
        .context(CsvOpenSnafu { path: path.clone() })?
        .iter()
        .map(|s| s.trim().to_string())
        .collect();
    debug!("read_csv_classifications: header: {:?}", header);
    let columns = cfs.columns(&header, &simplify_file_name(&path))?;

    let mut res: Vec<ParsedClassification> = Vec::new();
    for (idx, line_r) in rdr.records().enumerate() {
        // The header is the first line.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu {})?;
        let cell = |col: usize| -> RelResult<String> {
            let s = line.get(col).context(CsvLineTooShortSnafu { lineno })?;
            Ok(s.trim().to_string())
        };
        let retired = match columns.retired {
            Some(col) => Some(cell(col)?),
            None => None,
        };
        let pc = ParsedClassification {
            lineno,
            rater: cell(columns.rater)?,
            item: cell(columns.item)?,
            answer: cell(columns.answer)?,
            timestamp: RawTimestamp::Text(cell(columns.timestamp)?),
            retired,
        };
        debug!("read_csv_classifications: lineno: {:?} row: {:?}", lineno, pc);
        res.push(pc);
    }
    Ok(res)
}
