use clap::Parser;

/// Computes the reliability of raters in crowdsourced classification projects, and the
/// consensus answer of every item.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The project file, in JSON. All the paths in the project file are
    /// relative to its directory. For more information about the file format, read the manual
    /// of the rater_reliability crate.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference summary in JSON format. If provided, raterel will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the project will be written in
    /// JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) The classifications. Setting this option overrides the classification sources
    /// of the project file.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (csv or xlsx, default csv) The type of the input.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (file path) Where to write the reliability table in CSV.
    #[clap(long, value_parser)]
    pub reliability_out: Option<String>,

    /// (file path) Where to write the consensus table in CSV.
    #[clap(long, value_parser)]
    pub consensus_out: Option<String>,

    /// (file path) A reliability table written by a previous run. The reliability scores are
    /// not recomputed: only the consensus is run.
    #[clap(long, value_parser)]
    pub reliability_table: Option<String>,

    /// (default User_Name) The name of the column with the raters.
    #[clap(long, value_parser)]
    pub rater_column: Option<String>,

    /// (default Image_ID) The name of the column with the items.
    #[clap(long, value_parser)]
    pub item_column: Option<String>,

    /// (default Match) The name of the column with the answers.
    #[clap(long, value_parser)]
    pub answer_column: Option<String>,

    /// (default Class_Date) The name of the column with the time of the classifications.
    #[clap(long, value_parser)]
    pub timestamp_column: Option<String>,

    /// (optional) The name of the column that flags the retired items.
    #[clap(long, value_parser)]
    pub retired_column: Option<String>,

    /// (default "I can't figure this one out.") The answer given when a rater does not know.
    #[clap(long, value_parser)]
    pub unknown_answer: Option<String>,

    /// (list of comma-separated values, default Yes,No) The answers that may replace an
    /// unknown answer.
    #[clap(long, value_parser, value_delimiter = ',')]
    pub acceptable_answers: Option<Vec<String>>,

    /// (default 1000) Raters at this rank or worse cannot provide a replacement answer.
    #[clap(long, value_parser)]
    pub rank_ceiling: Option<f64>,

    /// (optional) Only resolve the items seen by at least this number of distinct raters.
    #[clap(long, value_parser)]
    pub min_raters: Option<u32>,

    /// When using an Excel file, indicates the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
