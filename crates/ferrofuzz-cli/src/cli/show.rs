//! `show` subcommand: regression mode — replay every crash artifact and
//! print a unique-by-traceback summary.

use anyhow::Context;
use ferrofuzz_core::controller::regress;
use ferrofuzz_core::tracer::ManualTracer;

use crate::cli::GlobalOptions;
use crate::targets;

#[derive(Debug, clap::Parser)]
pub struct ShowCommand {
    /// Name of a target registered in the demo registry.
    #[clap(long, default_value = "magic-byte")]
    target: String,
}

impl ShowCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<()> {
        let registry = targets::build_registry();
        let target = ferrofuzz_core::target::resolve(&registry, &self.target).context("resolving target")?;
        let tracer = ManualTracer::new();

        let summary = regress(target.as_ref(), &tracer, global.crash_dir()).context("replaying crash directory")?;

        if summary.is_empty() {
            println!("no crash artifacts reproduce in {}", global.crash_dir().display());
            return Ok(());
        }

        for (message, count) in &summary {
            println!("{count:>4}  {message}");
        }
        Ok(())
    }
}
