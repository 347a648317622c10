// Primitives for reading Excel files.

use calamine::DataType;

use crate::project::{io_common::number_to_id, *};

pub fn read_excel_classifications(
    path: String,
    cfs: &FileSource,
) -> BRelResult<Vec<ParsedClassification>> {
    let wrange = get_range(&path, cfs)?;

    let header: Vec<String> = wrange
        .rows()
        .next()
        .context(EmptyExcelSnafu {})?
        .iter()
        .map(|c| read_text_cell(c).unwrap_or_default())
        .collect();
    debug!("read_excel_classifications: header: {:?}", header);
    let columns = cfs.columns(&header, &path)?;

    let mut iter = wrange.rows();
    iter.next();
    let mut res: Vec<ParsedClassification> = Vec::new();
    for (idx, row) in iter.enumerate() {
        let lineno = idx + 2;
        let wrong_cell = |col: usize| {
            Box::new(RelError::ExcelWrongCellType {
                lineno: lineno as u64,
                content: format!("{:?} IN {:?}", row.get(col), row),
            })
        };
        let text = |col: usize| -> BRelResult<String> {
            match row.get(col) {
                None => Ok(String::new()),
                Some(c) => read_text_cell(c).ok_or_else(|| wrong_cell(col)),
            }
        };
        let timestamp = match row.get(columns.timestamp) {
            Some(DataType::String(s)) => RawTimestamp::Text(s.clone()),
            Some(DataType::Float(x)) | Some(DataType::DateTime(x)) => RawTimestamp::Serial(*x),
            Some(DataType::Int(x)) => RawTimestamp::Serial(*x as f64),
            Some(DataType::Empty) | None => RawTimestamp::Text(String::new()),
            Some(_) => return Err(wrong_cell(columns.timestamp)),
        };
        let retired = match columns.retired {
            Some(col) => Some(text(col)?),
            None => None,
        };
        let pc = ParsedClassification {
            lineno,
            rater: text(columns.rater)?,
            item: text(columns.item)?,
            answer: text(columns.answer)?,
            timestamp,
            retired,
        };
        debug!("read_excel_classifications: lineno: {:?} row: {:?}", lineno, pc);
        res.push(pc);
    }
    Ok(res)
}

/// Rater, item and answer cells are read as text. Numbers are accepted for the identifiers.
fn read_text_cell(cell: &DataType) -> Option<String> {
    match cell {
        DataType::String(s) => Some(s.trim().to_string()),
        DataType::Float(x) => Some(number_to_id(*x)),
        DataType::Int(x) => Some(x.to_string()),
        DataType::Bool(b) => Some(b.to_string()),
        DataType::Empty => Some(String::new()),
        _ => None,
    }
}

fn get_range(path: &String, cfs: &FileSource) -> BRelResult<calamine::Range<DataType>> {
    let worksheet_name_o = cfs.excel_worksheet_name.clone();
    debug!(
        "read_excel_file: path: {:?} worksheet: {:?}",
        &path, &worksheet_name_o
    );
    let mut workbook: Xlsx<_> =
        open_workbook(path.clone()).context(OpeningExcelSnafu { path: path.clone() })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(&worksheet_name)
            .context(EmptyExcelSnafu {})?
            .context(OpeningExcelSnafu { path: path.clone() })?;
        Ok(wrange)
    } else {
        let all_worksheets = workbook.worksheets();
        match all_worksheets.as_slice() {
            [] => Err(Box::new(RelError::EmptyExcel {})),
            [(worksheet_name, wrange)] => {
                debug!(
                    "read_excel_file: path: {:?} worksheet: {:?}",
                    &path, &worksheet_name
                );
                Ok(wrange.clone())
            }
            l => Err(Box::new(RelError::AmbiguousWorksheet {
                count: l.len(),
                path: path.clone(),
            })),
        }
    }
}
