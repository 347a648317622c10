use log::{debug, info, warn};

use rater_reliability::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Reader, Xlsx};

use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::project::config_reader::*;
use crate::project::output::*;

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_excel;
mod io_reliability;
mod output;

#[derive(Debug, Snafu)]
pub enum RelError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The worksheet is empty or missing"))]
    EmptyExcel {},
    #[snafu(display("Found {count} worksheets in {path}: the worksheet name must be provided"))]
    AmbiguousWorksheet { count: usize, path: String },
    #[snafu(display("Cell with an unexpected type at line {lineno}: {content}"))]
    ExcelWrongCellType { lineno: u64, content: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("A column must be referenced by its name or by its number (starting at 1)"))]
    ParsingJsonNumber {},
    #[snafu(display("Could not find column {column} in the header of {path}"))]
    MissingColumn { column: String, path: String },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading a CSV line"))]
    CsvLineParse { source: csv::Error },
    #[snafu(display("Line {lineno} is too short"))]
    CsvLineTooShort { lineno: usize },
    #[snafu(display("Could not understand the timestamp at line {lineno}: {content}"))]
    ParsingTimestamp { lineno: usize, content: String },
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing CSV file {path}"))]
    WritingCsv { source: csv::Error, path: String },
    #[snafu(display("Could not find the parent directory of the configuration"))]
    MissingParentDir {},
    #[snafu(display("No classification source detected"))]
    NoClassificationSource {},
    #[snafu(display("Provider not implemented: {provider}"))]
    UnknownProvider { provider: String },
    #[snafu(display("Line {lineno}: rater {rater} has a score but no rank"))]
    MissingRank { lineno: usize, rater: String },
    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    ReferenceMismatch {},
    #[snafu(display("{source}"))]
    Reliability { source: ReliabilityErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type RelResult<T> = Result<T, RelError>;
pub type BRelResult<T> = Result<T, Box<RelError>>;

/// A timestamp, as found in the input.
#[derive(PartialEq, Debug, Clone)]
pub enum RawTimestamp {
    Text(String),
    /// Days since 1899-12-30, the Excel convention.
    Serial(f64),
}

/// A classification, as parsed by the readers.
/// This is before dropping the empty answers and parsing the timestamps.
#[derive(PartialEq, Debug, Clone)]
pub struct ParsedClassification {
    pub lineno: usize,
    pub rater: String,
    pub item: String,
    pub answer: String,
    pub timestamp: RawTimestamp,
    pub retired: Option<String>,
}

/// Where the results should go.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RunOptions {
    /// A path, or 'stdout'.
    pub out: Option<String>,
    pub reliability_out: Option<String>,
    pub consensus_out: Option<String>,
    /// A reference summary to compare against.
    pub reference: Option<String>,
}

fn read_classification_data(
    root_path: &Path,
    cfs: &FileSource,
) -> BRelResult<Vec<ClassificationRecord>> {
    let p: PathBuf = root_path.join(&cfs.file_path);
    let p2 = p.as_path().display().to_string();
    info!("Attempting to read classification file {:?}", p2);
    let parsed = match cfs.provider.as_str() {
        "csv" => io_csv::read_csv_classifications(p2.clone(), cfs)?,
        "xlsx" | "excel" => io_excel::read_excel_classifications(p2.clone(), cfs)?,
        x => UnknownProviderSnafu { provider: x }.fail()?,
    };
    let records = validate_classifications(&parsed, cfs)?;
    info!(
        "Read {} classifications ({} rows) from {:?}",
        records.len(),
        parsed.len(),
        p2
    );
    Ok(records)
}

fn validate_classifications(
    parsed: &[ParsedClassification],
    cfs: &FileSource,
) -> RelResult<Vec<ClassificationRecord>> {
    let null_label = cfs.null_label();
    let retired_label = cfs.retired_label();
    let mut res: Vec<ClassificationRecord> = Vec::new();
    let mut skipped = 0;

    for pc in parsed.iter() {
        let is_missing = |s: &str| s.is_empty() || s == null_label;
        if is_missing(&pc.rater) || is_missing(&pc.item) || is_missing(&pc.answer) {
            debug!("validate_classifications: skipping incomplete row {:?}", pc);
            skipped += 1;
            continue;
        }
        let timestamp = match &pc.timestamp {
            RawTimestamp::Text(s) => io_common::parse_timestamp(s, cfs.timestamp_format.as_deref()),
            RawTimestamp::Serial(x) => io_common::excel_serial_to_datetime(*x),
        };
        let timestamp = timestamp.context(ParsingTimestampSnafu {
            lineno: pc.lineno,
            content: format!("{:?}", pc.timestamp),
        })?;
        let retired = pc.retired.as_ref().map(|s| s == retired_label);
        res.push(ClassificationRecord {
            rater_id: pc.rater.clone(),
            item_id: pc.item.clone(),
            answer: pc.answer.clone(),
            timestamp,
            retired,
        });
    }
    if skipped > 0 {
        warn!(
            "validate_classifications: skipped {} rows without rater, item or answer",
            skipped
        );
    }
    Ok(res)
}

fn validate_rules(rel_rules: &RelRules) -> RelResult<(ScoringRules, ResolutionRules)> {
    let defaults = ResolutionRules::default();
    let scoring = ScoringRules {
        bottom_tier_fraction: rel_rules
            .bottom_tier_fraction
            .unwrap_or(ScoringRules::DEFAULT_RULES.bottom_tier_fraction),
        answer_domain: rel_rules.answer_domain.clone(),
    };
    let min_raters = rel_rules.minimum_distinct_raters;
    let retirement = match (rel_rules.retirement.as_deref(), min_raters) {
        (None, None) | (Some("all"), _) => RetirementPolicy::AllItems,
        // Only a minimum is given.
        (None, Some(m)) => RetirementPolicy::MinimumRaters(m),
        (Some("flagged"), _) => RetirementPolicy::Flagged,
        (Some("minimumRaters"), Some(m)) => RetirementPolicy::MinimumRaters(m),
        (Some("flaggedOrMinimumRaters"), Some(m)) => RetirementPolicy::FlaggedOrMinimumRaters(m),
        (Some(x), None) if x == "minimumRaters" || x == "flaggedOrMinimumRaters" => {
            whatever!(
                "Retirement policy {:?} requires minimumDistinctRaters to be set",
                x
            )
        }
        (Some(x), _) => {
            whatever!("Cannot use retirement policy {:?}: unknown policy", x)
        }
    };
    let resolution = ResolutionRules {
        unknown_answer: rel_rules
            .unknown_answer
            .clone()
            .unwrap_or(defaults.unknown_answer),
        acceptable_answers: rel_rules
            .acceptable_answers
            .clone()
            .unwrap_or(defaults.acceptable_answers),
        rank_ceiling: rel_rules.rank_ceiling.unwrap_or(defaults.rank_ceiling),
        retirement,
        answer_domain: rel_rules.answer_domain.clone(),
    };
    Ok((scoring, resolution))
}

/// Today's session identifier, for example 2017_11_26.
fn session_id() -> String {
    use chrono::Datelike;
    let now = chrono::Local::now();
    format!("{}_{}_{}", now.year(), now.month(), now.day())
}

fn table_path(
    explicit: &Option<String>,
    config: &RelConfig,
    root_path: &Path,
    prefix: &str,
) -> Option<String> {
    if explicit.is_some() {
        return explicit.clone();
    }
    config.output_settings.output_directory.as_ref().map(|d| {
        root_path
            .join(d)
            .join(format!("{}_{}.csv", prefix, session_id()))
            .display()
            .to_string()
    })
}

/// Runs the whole project: loads the classifications, scores the raters (or loads
/// their scores), resolves the items and writes the results.
pub fn run_project(
    config: &RelConfig,
    root_path: &Path,
    options: &RunOptions,
) -> BRelResult<JSValue> {
    info!("config: {:?}", config);

    let (scoring_rules, resolution_rules) = validate_rules(&config.rules)?;

    if config.classification_sources.is_empty() {
        return Err(Box::new(RelError::NoClassificationSource {}));
    }

    let mut data: Vec<ClassificationRecord> = Vec::new();
    for cfs in config.classification_sources.iter() {
        let mut file_data = read_classification_data(root_path, cfs)?;
        data.append(&mut file_data);
    }
    debug!("data: {:?}", data);

    let (reliability, standings) = if let Some(rs) = &config.reliability_source {
        let p = root_path.join(&rs.file_path).display().to_string();
        info!("Using the reliability table {:?}", p);
        (None, io_reliability::read_reliability_table(p)?)
    } else {
        let res = run_reliability_scores(&data, &scoring_rules).context(ReliabilitySnafu {})?;
        let standings = res.standings();
        (Some(res), standings)
    };

    let consensus =
        resolve_consensus(&data, &standings, &resolution_rules).context(ReliabilitySnafu {})?;

    if let Some(res) = &reliability {
        if let Some(p) = table_path(&options.reliability_out, config, root_path, "reliability_scores") {
            write_reliability_csv(&p, res)?;
        }
    } else if let Some(p) = &options.reliability_out {
        warn!("Reliability scores come from a table, not writing them to {:?}", p);
    }
    if let Some(p) = table_path(&options.consensus_out, config, root_path, "consensus") {
        write_consensus_csv(&p, &consensus)?;
    }

    let summary_js = build_summary_js(
        config,
        data.len(),
        reliability.as_ref(),
        &standings,
        &consensus,
    );
    let pretty_js_stats = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {})?;

    match options.out.as_deref() {
        Some("stdout") => println!("{}", pretty_js_stats),
        Some(p) => {
            info!("Writing summary to {:?}", p);
            fs::write(p, &pretty_js_stats).context(WritingOutputSnafu { path: p })?;
        }
        None => {}
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &options.reference {
        let summary_ref = read_summary(summary_p.clone())?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return Err(Box::new(RelError::ReferenceMismatch {}));
        }
    }

    Ok(summary_js)
}

/// Builds the project from the command line, with the configuration file if any.
pub fn run_from_args(args: &Args) -> BRelResult<JSValue> {
    let (mut config, root_path) = match &args.config {
        Some(config_path) => {
            let config = read_config(config_path.clone())?;
            let root = Path::new(config_path.as_str())
                .parent()
                .context(MissingParentDirSnafu {})?
                .to_path_buf();
            (config, root)
        }
        None => (RelConfig::default(), PathBuf::from(".")),
    };
    apply_args(&mut config, args)?;

    let mut options = RunOptions {
        out: args.out.clone(),
        reliability_out: args.reliability_out.clone(),
        consensus_out: args.consensus_out.clone(),
        reference: args.reference.clone(),
    };
    if options.out.is_none()
        && options.reliability_out.is_none()
        && options.consensus_out.is_none()
        && config.output_settings.output_directory.is_none()
    {
        // Nowhere else to go.
        options.out = Some("stdout".to_string());
    }
    run_project(&config, &root_path, &options)
}

/// Command line options take precedence over the configuration file.
fn apply_args(config: &mut RelConfig, args: &Args) -> RelResult<()> {
    if let Some(input) = &args.input {
        let mut source = config
            .classification_sources
            .first()
            .cloned()
            .unwrap_or_default();
        source.file_path = input.clone();
        source.provider = match args.input_type.as_deref() {
            Some(t) => t.to_string(),
            None if input.ends_with(".xlsx") => "xlsx".to_string(),
            None => "csv".to_string(),
        };
        config.classification_sources = vec![source];
    } else if args.input_type.is_some() {
        whatever!("--input-type requires --input");
    }

    for source in config.classification_sources.iter_mut() {
        let columns = [
            (&args.rater_column, &mut source.rater_column),
            (&args.item_column, &mut source.item_column),
            (&args.answer_column, &mut source.answer_column),
            (&args.timestamp_column, &mut source.timestamp_column),
            (&args.retired_column, &mut source.retired_column),
        ];
        for (arg, field) in columns {
            if let Some(col) = arg {
                *field = Some(JSValue::String(col.clone()));
            }
        }
        if args.excel_worksheet_name.is_some() {
            source.excel_worksheet_name = args.excel_worksheet_name.clone();
        }
    }

    if let Some(p) = &args.reliability_table {
        config.reliability_source = Some(ReliabilitySource {
            file_path: p.clone(),
        });
    }

    let rules = &mut config.rules;
    if args.unknown_answer.is_some() {
        rules.unknown_answer = args.unknown_answer.clone();
    }
    if args.acceptable_answers.is_some() {
        rules.acceptable_answers = args.acceptable_answers.clone();
    }
    if args.rank_ceiling.is_some() {
        rules.rank_ceiling = args.rank_ceiling;
    }
    if let Some(m) = args.min_raters {
        rules.minimum_distinct_raters = Some(m);
        if rules.retirement.is_none() {
            rules.retirement = Some("minimumRaters".to_string());
        }
    }
    Ok(())
}

fn run_project_test(test_name: &str, config_lpath: &str, summary_lpath: &str) -> BRelResult<()> {
    let test_dir = option_env!("REL_TEST_DIR")
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("{}/tests/data", env!("CARGO_MANIFEST_DIR")));
    info!("Running test {}", test_name);
    let config_path = format!("{}/{}/{}", test_dir, test_name, config_lpath);
    let config = read_config(config_path.clone())?;
    let root = Path::new(config_path.as_str())
        .parent()
        .context(MissingParentDirSnafu {})?;
    let options = RunOptions {
        reference: Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
        ..Default::default()
    };
    run_project(&config, root, &options)?;
    Ok(())
}

pub fn test_wrapper(test_name: &str) {
    let res = run_project_test(
        test_name,
        format!("{}_config.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    );
    if let Err(e) = &res {
        eprintln!("An error occured {}", e);
    }
    assert!(res.is_ok(), "test {} failed: {:?}", test_name, res);
}
