use crate::cli::args::{Cli, Command, SlotArg};
use calibra_core::config::{load_config, CalibraConfig};
use calibra_core::model::ConfigSlot;
use calibra_core::storage::Store;
use std::path::Path;

pub mod compare;
pub mod dataset;
pub mod docs;
pub mod init;
pub mod inspect;
pub mod review;

pub mod exit_codes {
    use calibra_core::errors::{as_calibra_error, CalibraError, ConfigError};

    pub const OK: i32 = 0;
    pub const TEST_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;

    /// Configuration problems exit 2, domain rejections exit 1.
    pub fn for_error(err: &anyhow::Error) -> i32 {
        if err.chain().any(|c| c.downcast_ref::<ConfigError>().is_some()) {
            return CONFIG_ERROR;
        }
        match as_calibra_error(err) {
            Some(CalibraError::InvalidConfiguration(_)) => CONFIG_ERROR,
            Some(_) => TEST_FAILED,
            None => CONFIG_ERROR,
        }
    }
}

/// Loaded config plus an initialized store.
pub struct Ctx {
    pub cfg: CalibraConfig,
    pub store: Store,
}

pub fn open_ctx(config: &Path, strict: bool) -> anyhow::Result<Ctx> {
    let mut cfg = load_config(config, strict)?;
    cfg.apply_overrides(|key| std::env::var(key).ok());

    let store = if cfg.db == ":memory:" {
        Store::memory()?
    } else {
        let db = Path::new(&cfg.db);
        ensure_parent_dir(db)?;
        Store::open(db)?
    };
    store.init_schema()?;
    tracing::debug!(event = "calibra.store.opened", db = %cfg.db);
    Ok(Ctx { cfg, store })
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub(crate) fn slot(arg: SlotArg) -> ConfigSlot {
    match arg {
        SlotArg::A => ConfigSlot::A,
        SlotArg::B => ConfigSlot::B,
    }
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    if let Command::Version = cli.cmd {
        println!("calibra {}", env!("CARGO_PKG_VERSION"));
        return Ok(exit_codes::OK);
    }
    if let Command::Init(args) = &cli.cmd {
        return init::cmd_init(&cli.config, args);
    }

    let ctx = open_ctx(&cli.config, cli.strict)?;
    match cli.cmd {
        Command::Dataset(args) => dataset::cmd_dataset(&ctx, args),
        Command::Docs(args) => docs::cmd_docs(&ctx, args),
        Command::Compare(args) => compare::cmd_compare(&ctx, args).await,
        Command::Comparisons => inspect::cmd_list(&ctx),
        Command::Status(args) => inspect::cmd_status(&ctx, args.comparison),
        Command::Watch(args) => inspect::cmd_watch(&ctx, args).await,
        Command::Trials(args) => inspect::cmd_trials(&ctx, args),
        Command::Diff(args) => inspect::cmd_diff(&ctx, args),
        Command::Review(args) => review::cmd_review(&ctx, args),
        Command::Export(args) => review::cmd_export(&ctx, args),
        Command::Init(_) | Command::Version => Ok(exit_codes::OK),
    }
}

/// Reads a JSONL file into `T`, one value per non-empty line.
pub(crate) fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    use anyhow::Context;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid JSON line", path.display(), i + 1))
        })
        .collect()
}
