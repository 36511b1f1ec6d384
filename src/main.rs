use std::{io::Write, path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use colored::Colorize;

use cross_gcc::{
    archive::PackageFormat,
    config::{BuildOptions, Overrides, SettingsOrigin, resolve_settings},
    download::cache_dir,
    install_toolchain, interrupt,
    preflight::host_triple,
    profile::{Arch, Source, Toolchain},
    prune_cache, resolve_toolchain,
    versions::ResolveError,
};

#[derive(Parser)]
#[command(about, long_about = None)]
struct Cli {
    #[arg(long, short = 'V', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    #[arg(short, long, value_enum)]
    /// Target architecture
    arch: Arch,
    #[arg(short, long, value_enum)]
    /// Where GCC comes from [default: gnu]
    source: Option<Source>,
    #[arg(short, long)]
    /// GCC major version, e.g. 8
    version: String,
    #[arg(short, long)]
    /// Fetch release tarballs instead of cloning git repositories
    tarballs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and install a cross toolchain
    Build {
        #[command(flatten)]
        target: Target,
        #[arg(short, long)]
        /// The number of jobs passed to make [default: number of CPUs]
        jobs: Option<u64>,
        #[arg(short, long, value_enum)]
        /// Package the installed toolchain into a tarball
        package: Option<PackageFormat>,
        #[arg(long)]
        /// Don't refresh existing git clones
        no_update: bool,
        #[arg(long)]
        /// Build on disk instead of in a tmpfs
        no_tmpfs: bool,
        #[arg(long)]
        /// Size of the tmpfs, as accepted by `mount -o size=` [default: 75%]
        tmpfs_size: Option<String>,
        #[arg(long)]
        /// Clone full git histories instead of shallow clones
        full_src: bool,
        #[arg(long)]
        /// Don't strip host binaries
        no_strip: bool,
        #[arg(long)]
        /// Where sources and the staging tree are kept
        work_dir: Option<PathBuf>,
        #[arg(long)]
        /// The toolchain is installed into `<install-dir>/<triple>` [default: current directory]
        install_dir: Option<PathBuf>,
    },
    /// Print what a build would use, without fetching or building anything
    Resolve {
        #[command(flatten)]
        target: Target,
    },
    /// Manage cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    Dir {},
    /// Remove downloads, logs and source trees
    Prune {},
}

fn run(cli: Cli) -> Result<()> {
    let (settings, origin) = resolve_settings()?;
    match &origin {
        SettingsOrigin::Local(path) | SettingsOrigin::Global(path) => {
            log::debug!("using configuration from {}", path.display())
        }
        SettingsOrigin::Default => log::debug!("no configuration file found"),
    }

    match cli.command {
        Commands::Build {
            target,
            jobs,
            package,
            no_update,
            no_tmpfs,
            tmpfs_size,
            full_src,
            no_strip,
            work_dir,
            install_dir,
        } => {
            let overrides = Overrides {
                source: target.source,
                work_dir,
                install_dir,
                jobs,
                package,
                tmpfs_size,
                no_tmpfs,
                no_update,
                tarballs: target.tarballs,
                full_src,
                no_strip,
                verbose: cli.verbose > 0,
            };
            let options = BuildOptions::new(&settings.build, &overrides);
            let toolchain = resolve_toolchain(target.arch, &target.version, &options, host_triple)?;

            log::info!("{toolchain}");
            let report = install_toolchain(&toolchain, &options)?;

            println!();
            println!("{} {}", "installed".green().bold(), toolchain.id());
            println!("  gcc:      {}", toolchain.release.gcc);
            println!(
                "  glibc:    {}, isl {}",
                toolchain.release.glibc, toolchain.release.isl
            );
            println!("  prefix:   {}", report.dir.display());
            if let Some(version) = &report.compiler_version {
                println!("  compiler: {version}");
            }
            if let Some(archive) = &report.archive {
                println!("  archive:  {}", archive.display());
            }
            println!("  took:     {}s", report.elapsed.as_secs());
            println!();
            println!(
                "{}",
                format!("export PATH=\"{}:$PATH\"", toolchain.bin_dir().display()).dimmed()
            );
        }
        Commands::Resolve { target } => {
            let overrides = Overrides {
                source: target.source,
                tarballs: target.tarballs,
                ..Default::default()
            };
            let options = BuildOptions::new(&settings.build, &overrides);
            let toolchain = Toolchain::resolve(
                target.arch,
                options.source,
                &target.version,
                options.mode,
                options.layout()?,
                // only used by glibc's configure
                "",
            )?;
            println!("{toolchain}");
            println!("prefix:   {}", toolchain.dir().display());
        }
        Commands::Cache { action } => {
            let options = BuildOptions::new(&settings.build, &Overrides::default());
            match action {
                CacheAction::Dir {} => {
                    log::info!("{}", cache_dir()?.display());
                    if options.work_dir != cache_dir()? {
                        log::info!("{}", options.work_dir.display());
                    }
                }
                CacheAction::Prune {} => prune_cache(&options.work_dir)?,
            }
        }
    };

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .format(|buf, record| {
            let warn_style = buf.default_level_style(log::Level::Warn);
            match record.level() {
                log::Level::Info => {
                    writeln!(buf, "{}", record.args())
                }
                _ => {
                    writeln!(buf, "{warn_style}{}{warn_style:#}", record.args())
                }
            }
        })
        .init();

    if let Err(e) = interrupt::install_handlers() {
        log::warn!("{e:#}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.downcast_ref::<interrupt::Interrupted>().is_some() || interrupt::is_interrupted() {
                eprintln!("{}", "interrupted, cleaned up".yellow());
                return ExitCode::from(130);
            }
            eprintln!("{} {e:#}", "error:".red().bold());
            if e.downcast_ref::<ResolveError>().is_some() {
                eprintln!();
                let _ = Cli::command().print_help();
            }
            ExitCode::FAILURE
        }
    }
}
