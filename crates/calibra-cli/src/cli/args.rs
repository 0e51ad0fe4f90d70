use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "calibra",
    version,
    about = "Compare extraction configs, review disagreements and grow regression datasets"
)]
pub struct Cli {
    #[arg(long, global = true, default_value = "calibra.yaml", env = "CALIBRA_CONFIG")]
    pub config: PathBuf,

    /// fail on unknown config keys instead of warning
    #[arg(long, global = true)]
    pub strict: bool,

    /// emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample calibra.yaml
    Init(InitArgs),
    Dataset(DatasetArgs),
    Docs(DocsArgs),
    /// Create a comparison and run it to completion
    Compare(CompareArgs),
    /// List comparisons, newest first
    Comparisons,
    /// Print a comparison as JSON
    Status(ComparisonRef),
    /// Poll a comparison until it reaches a terminal state
    Watch(WatchArgs),
    /// List trials (dataset mode) or articles (calibration mode)
    Trials(TrialsArgs),
    /// Field-by-field diff of both extractions for one document
    Diff(DiffArgs),
    /// Submit a review for one calibration document
    Review(ReviewArgs),
    /// Export reviewed documents as a new dataset
    Export(ExportArgs),
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    /// overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Clone)]
pub struct DatasetArgs {
    #[command(subcommand)]
    pub cmd: DatasetSub,
}

#[derive(Subcommand, Clone)]
pub enum DatasetSub {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Add test cases from JSONL: {input_text, expected_extraction, importance?}
    Import {
        #[arg(long)]
        dataset: i64,
        #[arg(long)]
        file: PathBuf,
    },
    List,
    Show {
        #[arg(long)]
        dataset: i64,
    },
}

#[derive(Parser, Clone)]
pub struct DocsArgs {
    #[command(subcommand)]
    pub cmd: DocsSub,
}

#[derive(Subcommand, Clone)]
pub enum DocsSub {
    /// Add live documents from JSONL: {source, category?, text}
    Import {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Dataset,
    Calibration,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeArg {
    Schema,
    Pipeline,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotArg {
    A,
    B,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CompareArgs {
    #[arg(long, value_enum, default_value = "dataset")]
    pub mode: ModeArg,

    #[arg(long = "type", value_enum, default_value = "schema")]
    pub kind: TypeArg,

    /// provider/model
    #[arg(long)]
    pub config_a: String,

    /// provider/model
    #[arg(long)]
    pub config_b: String,

    #[arg(long)]
    pub dataset: Option<i64>,

    /// iterations per case (dataset mode)
    #[arg(long, default_value_t = 1)]
    pub iterations: u32,

    /// documents to sample (calibration mode)
    #[arg(long, default_value_t = 10)]
    pub count: u32,

    #[arg(long)]
    pub source: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    /// dataset-mode scorer: field_f1 | exact_match
    #[arg(long, default_value = "field_f1")]
    pub scorer: String,

    /// write comparison + trials as JSON
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// do not print per-trial progress
    #[arg(long)]
    pub quiet: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ComparisonRef {
    #[arg(long)]
    pub comparison: i64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct WatchArgs {
    #[arg(long)]
    pub comparison: i64,

    /// seconds between polls (default from config, else 5)
    #[arg(long)]
    pub interval: Option<u64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct TrialsArgs {
    #[arg(long)]
    pub comparison: i64,

    #[arg(long, default_value = "text")]
    pub format: String, // text|json
}

#[derive(clap::Args, Debug, Clone)]
pub struct DiffArgs {
    #[arg(long)]
    pub comparison: i64,

    #[arg(long)]
    pub document: i64,

    /// fields rendered first, comma separated
    #[arg(long, value_delimiter = ',')]
    pub priority: Vec<String>,

    /// fields left out of the diff, comma separated
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    #[arg(long, default_value = "text")]
    pub format: String, // text|json
}

#[derive(clap::Args, Debug, Clone)]
pub struct ReviewArgs {
    #[arg(long)]
    pub comparison: i64,

    #[arg(long)]
    pub document: i64,

    /// accept one config's extraction wholesale
    #[arg(long, value_enum)]
    pub choose: Option<SlotArg>,

    /// golden extraction as a JSON file
    #[arg(long, conflicts_with = "prefer")]
    pub golden: Option<PathBuf>,

    /// per-field override, e.g. --prefer city=b (repeatable)
    #[arg(long)]
    pub prefer: Vec<String>,

    /// side used for fields without an override when merging
    #[arg(long, value_enum, default_value = "a")]
    pub default: SlotArg,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExportArgs {
    #[arg(long)]
    pub comparison: i64,

    #[arg(long)]
    pub name: String,

    #[arg(long, default_value = "")]
    pub description: String,
}
