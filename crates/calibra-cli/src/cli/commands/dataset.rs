use super::{exit_codes, read_jsonl, Ctx};
use crate::cli::args::{DatasetArgs, DatasetSub};
use calibra_core::errors::CalibraError;
use calibra_core::model::NewTestCase;

pub fn cmd_dataset(ctx: &Ctx, args: DatasetArgs) -> anyhow::Result<i32> {
    match args.cmd {
        DatasetSub::Create { name, description } => {
            if name.trim().is_empty() {
                return Err(CalibraError::InvalidConfiguration(
                    "dataset name must not be empty".into(),
                )
                .into());
            }
            let ds = ctx.store.create_dataset(name.trim(), &description, None)?;
            eprintln!("✅ Created dataset #{} ({})", ds.id, ds.name);
            println!("{}", serde_json::to_string_pretty(&ds)?);
            Ok(exit_codes::OK)
        }
        DatasetSub::Import { dataset, file } => {
            let cases: Vec<NewTestCase> = read_jsonl(&file)?;
            if let Some(i) = cases
                .iter()
                .position(|c| !c.expected_extraction.is_object())
            {
                return Err(CalibraError::InvalidConfiguration(format!(
                    "case {} in {}: expected_extraction must be a JSON object",
                    i + 1,
                    file.display()
                ))
                .into());
            }
            let n = ctx.store.add_test_cases(dataset, &cases)?;
            eprintln!("✅ Imported {} cases into dataset #{}", n, dataset);
            Ok(exit_codes::OK)
        }
        DatasetSub::List => {
            for ds in ctx.store.list_datasets()? {
                let origin = ds
                    .source_comparison_id
                    .map(|c| format!("from comparison #{}", c))
                    .unwrap_or_default();
                println!("{}\t{}\t{} cases\t{}", ds.id, ds.name, ds.case_count, origin);
            }
            Ok(exit_codes::OK)
        }
        DatasetSub::Show { dataset } => {
            let ds = ctx
                .store
                .get_dataset(dataset)?
                .ok_or_else(|| CalibraError::NotFound(format!("dataset {}", dataset)))?;
            let cases = ctx.store.list_test_cases(dataset)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "dataset": ds,
                    "cases": cases,
                }))?
            );
            Ok(exit_codes::OK)
        }
    }
}
