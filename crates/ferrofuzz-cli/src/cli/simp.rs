//! `simp` subcommand: crash simplifier.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use ferrofuzz_core::error::Error;
use ferrofuzz_core::simplifier::simplify;
use ferrofuzz_core::tracer::ManualTracer;

use crate::cli::GlobalOptions;
use crate::targets;

#[derive(Debug, clap::Parser)]
pub struct SimpCommand {
    /// Name of a target registered in the demo registry.
    #[clap(long, default_value = "magic-byte")]
    target: String,

    /// Directory to write shrunk `simp-<hash>` artifacts into.
    #[clap(long)]
    output_dir: PathBuf,

    #[clap(long, default_value_t = 60)]
    time_budget_secs: u64,

    #[clap(long)]
    num_workers: Option<usize>,
}

impl SimpCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<()> {
        let registry = targets::build_registry();
        let target = ferrofuzz_core::target::resolve(&registry, &self.target).context("resolving target")?;
        let tracer = ManualTracer::new();
        let num_workers = self.num_workers.unwrap_or_else(num_cpus::get);
        let budget = Duration::from_secs(self.time_budget_secs);

        let crash_dir = global.crash_dir();
        if !crash_dir.exists() {
            tracing::warn!(dir = %crash_dir.display(), "crash directory does not exist, nothing to simplify");
            return Ok(());
        }
        fs::create_dir_all(&self.output_dir).context("creating output directory")?;

        for entry in fs::read_dir(crash_dir).context("reading crash directory")? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let out_name = format!("simp-{}", name.strip_prefix("crash-").unwrap_or(&name));
            let out_path = self.output_dir.join(&out_name);
            if out_path.exists() {
                continue;
            }

            let data = fs::read(entry.path())?;
            match simplify(target.as_ref(), &tracer, &data, budget, num_workers) {
                Ok(simplified) => {
                    fs::write(&out_path, &simplified)
                        .with_context(|| format!("writing {}", out_path.display()))?;
                    tracing::info!(
                        from = %entry.path().display(),
                        to = %out_path.display(),
                        before = data.len(),
                        after = simplified.len(),
                        "simplified crash artifact"
                    );
                }
                Err(Error::InvalidSample(reason)) => {
                    tracing::warn!(path = %entry.path().display(), reason, "artifact no longer crashes, skipping");
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("simplifying {}", entry.path().display()));
                }
            }
        }

        Ok(())
    }
}
