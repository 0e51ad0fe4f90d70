use super::{exit_codes, read_jsonl, Ctx};
use crate::cli::args::{DocsArgs, DocsSub};
use calibra_core::model::NewDocument;

pub fn cmd_docs(ctx: &Ctx, args: DocsArgs) -> anyhow::Result<i32> {
    match args.cmd {
        DocsSub::Import { file } => {
            let docs: Vec<NewDocument> = read_jsonl(&file)?;
            let ids = ctx.store.insert_documents(&docs)?;
            eprintln!("✅ Imported {} documents", ids.len());
            Ok(exit_codes::OK)
        }
    }
}
