use anyhow::{Context, Result};
use clap::Parser;
use gobind_core::gobind_model::Resolve;
use gobind_core::{Files, PackageGenerator};
use std::path::{Path, PathBuf};

/// Helper for passing VERSION to opt.
/// If CARGO_VERSION_INFO is set, use it, otherwise use CARGO_PKG_VERSION.
fn version() -> &'static str {
    option_env!("CARGO_VERSION_INFO").unwrap_or(env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Parser)]
#[command(version = version())]
struct Opt {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Generates the C# module and C bridge for every package in a surface.
    Generate {
        #[clap(flatten)]
        opts: gobind_csharp::Opts,

        #[clap(flatten)]
        common: Common,
    },
    /// Loads a surface description and reports diagnostics without writing
    /// any output.
    Validate {
        #[clap(flatten)]
        common: Common,
    },
}

#[derive(Debug, Parser, Clone)]
struct Common {
    /// Exported-surface description (JSON) of the packages under binding.
    #[clap(value_name = "SURFACE")]
    surface: PathBuf,

    /// Where to place output files
    #[clap(long = "out-dir")]
    out_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let opt: Opt = Opt::parse();

    match opt.command {
        Command::Generate { opts, common } => {
            let resolve = load_surface(&common.surface)?;
            let mut files = Files::default();
            let mut generator = opts.build();
            run_passes(&mut *generator, &resolve, &mut files)?;

            for (name, contents) in files.iter() {
                let dst = match &common.out_dir {
                    Some(path) => path.join(name),
                    None => name.into(),
                };
                println!("Generating {dst:?}");
                if let Some(parent) = dst.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {parent:?}"))?;
                }
                std::fs::write(&dst, contents)
                    .with_context(|| format!("failed to write {dst:?}"))?;
            }
        }
        Command::Validate { common } => {
            let resolve = load_surface(&common.surface)?;
            let mut files = Files::default();
            let mut generator = gobind_csharp::Opts::default().build();
            run_passes(&mut *generator, &resolve, &mut files)?;
            eprintln!(
                "surface parsed successfully: {} package(s), all checks passed",
                resolve.packages.len()
            );
        }
    }

    Ok(())
}

fn load_surface(path: &Path) -> Result<Resolve> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {path:?}"))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {path:?}"))
}

/// The root pass emits the one-per-program runtime; every package then gets
/// its own pass.
fn run_passes(
    generator: &mut dyn PackageGenerator,
    resolve: &Resolve,
    files: &mut Files,
) -> Result<()> {
    generator.generate(resolve, None, files)?;
    for pkg in &resolve.packages {
        generator.generate(resolve, Some(&pkg.name), files)?;
    }
    Ok(())
}
