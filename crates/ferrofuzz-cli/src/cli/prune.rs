//! `prune` subcommand: delete crash artifacts that no longer reproduce.

use anyhow::Context;
use ferrofuzz_core::prune::prune;
use ferrofuzz_core::target;

use crate::cli::GlobalOptions;
use crate::targets;

#[derive(Debug, clap::Parser)]
pub struct PruneCommand {
    /// Name of a target registered in the demo registry.
    #[clap(long, default_value = "magic-byte")]
    target: String,
}

impl PruneCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<()> {
        let registry = targets::build_registry();
        let resolved = target::resolve(&registry, &self.target).context("resolving target")?;
        let deleted = prune(resolved.as_ref(), global.crash_dir()).context("pruning crash directory")?;
        tracing::info!(count = deleted.len(), "pruned stale crash artifacts");
        Ok(())
    }
}
