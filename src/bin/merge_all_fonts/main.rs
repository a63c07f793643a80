/// Composite system font builder binary entry point
///
/// Builds `KSM-JA-Medium.ttf`, `KSM-SC-Medium.ttf` and `KSM-TC-Medium.ttf` from the
/// fonts under `src_fonts/`.
///
/// # Examples
///
/// Build everything from the repository root:
/// ```sh
/// cargo run --bin merge_all_fonts
/// ```
///
/// Preview the scripts for one output:
/// ```sh
/// cargo run --bin merge_all_fonts -- --dry-run --only KSM-JA-Medium.ttf
/// ```
use clap::Parser;
use ksm_font_merge::config::{self, ConfigSource, MergePlan, PROJECT_PLAN_FILE};
use ksm_font_merge::pipeline::{self, RunOptions};
use log::{debug, error, info};
use std::process;

mod args;
mod logging;

use args::MergeAllFontsArgs;
use logging::init_logging;

fn main() {
    let args = MergeAllFontsArgs::parse();

    if args.print_default_config {
        print!("{}", config::default_plan_toml());
        return;
    }

    if let Err(e) = init_logging(&args) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    debug!("Parsed arguments: {:?}", args);

    match run(&args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

/// Loads the merge plan the arguments point at.
fn load_plan(args: &MergeAllFontsArgs) -> Result<MergePlan, Box<dyn std::error::Error>> {
    let project_plan = args.project_root.join(PROJECT_PLAN_FILE);
    let plan = match &args.config {
        Some(path) => {
            info!("Using merge plan {}", path.display());
            config::load_plan(ConfigSource::File(path))?
        }
        None if project_plan.is_file() => {
            info!("Using merge plan {}", project_plan.display());
            config::load_plan(ConfigSource::File(&project_plan))?
        }
        None => {
            debug!("Using built-in merge plan");
            config::load_plan(ConfigSource::Default)?
        }
    };
    Ok(plan)
}

/// Returns whether every selected output was built.
fn run(args: &MergeAllFontsArgs) -> Result<bool, Box<dyn std::error::Error>> {
    let plan = load_plan(args)?;

    let options = RunOptions {
        project_root: args.project_root.clone(),
        fontforge: args.fontforge.clone(),
        only: args.only.clone(),
        dry_run: args.dry_run,
        keep_scripts: args.keep_scripts,
        skip_postprocess: args.skip_postprocess,
    };

    let summary = pipeline::run(&plan, &options)?;
    Ok(summary.all_succeeded())
}
