use crate::project::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "projectName")]
    pub project_name: String,
    #[serde(rename = "projectDate")]
    pub project_date: Option<String>,
    /// The reliability and consensus tables are written in this directory, when provided.
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            project_name: "classification project".to_string(),
            project_date: None,
            output_directory: None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub project: String,
    pub date: Option<String>,
    pub classifications: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "raterColumn")]
    pub rater_column: Option<JSValue>,
    #[serde(rename = "itemColumn")]
    pub item_column: Option<JSValue>,
    #[serde(rename = "answerColumn")]
    pub answer_column: Option<JSValue>,
    #[serde(rename = "timestampColumn")]
    pub timestamp_column: Option<JSValue>,
    #[serde(rename = "retiredColumn")]
    pub retired_column: Option<JSValue>,
    #[serde(rename = "retiredLabel")]
    pub retired_label: Option<String>,
    #[serde(rename = "nullLabel")]
    pub null_label: Option<String>,
    /// A chrono format, for timestamps that are not in one of the usual formats.
    #[serde(rename = "timestampFormat")]
    pub timestamp_format: Option<String>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

impl Default for FileSource {
    fn default() -> Self {
        FileSource {
            provider: "csv".to_string(),
            file_path: String::new(),
            rater_column: None,
            item_column: None,
            answer_column: None,
            timestamp_column: None,
            retired_column: None,
            retired_label: None,
            null_label: None,
            timestamp_format: None,
            excel_worksheet_name: None,
        }
    }
}

/// The positions of the columns in a source, starting at 0.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct SourceColumns {
    pub rater: usize,
    pub item: usize,
    pub answer: usize,
    pub timestamp: usize,
    pub retired: Option<usize>,
}

impl FileSource {
    pub fn retired_label(&self) -> &str {
        self.retired_label.as_deref().unwrap_or("Retired")
    }

    pub fn null_label(&self) -> &str {
        self.null_label.as_deref().unwrap_or("null")
    }

    /// Finds all the columns of this source in the header of the file.
    pub fn columns(&self, header: &[String], path: &str) -> RelResult<SourceColumns> {
        let find = |x: &Option<JSValue>, default: &str| -> RelResult<usize> {
            let reference = x
                .clone()
                .unwrap_or_else(|| JSValue::String(default.to_string()));
            find_column(&reference, header, path)
        };
        Ok(SourceColumns {
            rater: find(&self.rater_column, "User_Name")?,
            item: find(&self.item_column, "Image_ID")?,
            answer: find(&self.answer_column, "Match")?,
            timestamp: find(&self.timestamp_column, "Class_Date")?,
            retired: match &self.retired_column {
                Some(x) => Some(find_column(x, header, path)?),
                None => None,
            },
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilitySource {
    #[serde(rename = "filePath")]
    pub file_path: String,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelRules {
    #[serde(rename = "unknownAnswer")]
    pub unknown_answer: Option<String>,
    #[serde(rename = "acceptableAnswers")]
    pub acceptable_answers: Option<Vec<String>>,
    #[serde(rename = "rankCeiling")]
    pub rank_ceiling: Option<f64>,
    #[serde(rename = "minimumDistinctRaters")]
    pub minimum_distinct_raters: Option<u32>,
    pub retirement: Option<String>,
    #[serde(rename = "bottomTierFraction")]
    pub bottom_tier_fraction: Option<f64>,
    #[serde(rename = "answerDomain")]
    pub answer_domain: Option<Vec<String>>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelConfig {
    #[serde(rename = "outputSettings", default)]
    pub output_settings: OutputSettings,
    #[serde(rename = "classificationSources", default)]
    pub classification_sources: Vec<FileSource>,
    #[serde(rename = "reliabilitySource")]
    pub reliability_source: Option<ReliabilitySource>,
    #[serde(default)]
    pub rules: RelRules,
}

pub fn read_config(path: String) -> BRelResult<RelConfig> {
    let contents = fs::read_to_string(path.clone()).context(OpeningJsonSnafu { path })?;
    let config: RelConfig = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    Ok(config)
}

pub fn read_summary(path: String) -> BRelResult<JSValue> {
    let contents = fs::read_to_string(path.clone()).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

/// A column is either referenced by its number (starting at 1) or by its name in the header.
fn find_column(reference: &JSValue, header: &[String], path: &str) -> RelResult<usize> {
    let idx = match reference {
        JSValue::Number(_) => read_js_int(reference)?,
        JSValue::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            read_js_int(reference)?
        }
        JSValue::String(s) => {
            return header
                .iter()
                .position(|h| h == s)
                .context(MissingColumnSnafu {
                    column: s.clone(),
                    path,
                })
        }
        _ => return ParsingJsonNumberSnafu {}.fail(),
    };
    if idx == 0 || idx > header.len() {
        return MissingColumnSnafu {
            column: idx.to_string(),
            path,
        }
        .fail();
    }
    Ok(idx - 1)
}

fn read_js_int(x: &JSValue) -> RelResult<usize> {
    match x {
        JSValue::Number(n) => n
            .as_u64()
            .map(|x| x as usize)
            .context(ParsingJsonNumberSnafu {}),
        JSValue::String(s) => s.parse::<usize>().ok().context(ParsingJsonNumberSnafu {}),
        _ => None.context(ParsingJsonNumberSnafu {}),
    }
}
