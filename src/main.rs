//! aclgen - network access-control policy renderer
//!
//! Reads JSON policy files and renders them for each backend their headers
//! target.
//!
//! # Usage
//!
//! ```bash
//! aclgen render policies/edge.json              # Render every targeted backend
//! aclgen render edge.json --platform iptables   # Render one backend only
//! aclgen render edge.json -o out/ --diff        # Write to out/, show changes
//! aclgen check policies/*.json                  # Validate without writing
//! aclgen tokens nsxv                            # Keywords a backend supports
//! aclgen version                                # Build information
//! ```
//!
//! Logging goes to stderr; repeat `-v` for info and debug detail.

use aclgen::config::load_config;
use aclgen::core::aclgen::{Platform, RenderContext};
use aclgen::core::policy_files::{diff_against_existing, load_policy, output_path, write_output};
use aclgen::core::policy::Policy;
use aclgen::{Error, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "aclgen")]
#[command(about = "Render network access-control policies for iptables and NSX-V", long_about = None)]
struct Cli {
    /// Increase log detail (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render policy files and write the output next to them
    Render {
        /// Policy files (JSON)
        #[arg(required = true)]
        policies: Vec<PathBuf>,
        /// Only render this backend
        #[arg(short, long)]
        platform: Option<Platform>,
        /// Directory for rendered files (default: beside each policy)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Weeks ahead to report expiring terms
        #[arg(long, value_name = "WEEKS")]
        exp_info: Option<u32>,
        /// Print a diff against the existing output before writing
        #[arg(long)]
        diff: bool,
        /// Config file (default: $XDG_CONFIG_HOME/aclgen/config.json)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Render policy files without writing anything
    Check {
        /// Policy files (JSON)
        #[arg(required = true)]
        policies: Vec<PathBuf>,
        /// Only check this backend
        #[arg(short, long)]
        platform: Option<Platform>,
        /// Config file (default: $XDG_CONFIG_HOME/aclgen/config.json)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Print the keywords a backend supports as JSON
    Tokens {
        platform: Platform,
    },
    /// Show version and build information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let translation = e.translate();
            eprintln!("Error: {}", translation.user_message);
            for suggestion in translation.suggestions {
                eprintln!("  hint: {suggestion}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Backends to render for a policy: the requested one, or every supported
/// backend its headers name.
fn platforms_for(policy: &Policy, requested: Option<Platform>) -> Vec<Platform> {
    if let Some(platform) = requested {
        return vec![platform];
    }
    policy
        .platforms()
        .into_iter()
        .filter_map(|name| match name.parse::<Platform>() {
            Ok(platform) => Some(platform),
            Err(_) => {
                warn!("Policy {} targets unsupported platform {}; skipping", policy.name, name);
                None
            }
        })
        .collect()
}

async fn render_file(
    path: &Path,
    requested: Option<Platform>,
    ctx: &RenderContext,
) -> Result<Vec<(Platform, String)>> {
    let policy = load_policy(path).await?;
    let platforms = platforms_for(&policy, requested);
    if platforms.is_empty() {
        warn!("Policy {} has no supported targets", path.display());
    }

    let mut rendered = Vec::with_capacity(platforms.len());
    for platform in platforms {
        let text = platform.generator().render(&policy, ctx)?;
        rendered.push((platform, text));
    }
    Ok(rendered)
}

async fn handle_cli(command: Commands) -> Result<()> {
    match command {
        Commands::Render {
            policies,
            platform,
            output,
            exp_info,
            diff,
            config,
        } => {
            let config = load_config(config.as_deref()).await?;
            let mut ctx = RenderContext::from_config(&config);
            if let Some(weeks) = exp_info {
                ctx.exp_info_weeks = weeks;
            }
            let output_dir = output.or_else(|| config.output_dir.clone());

            for path in &policies {
                for (platform, text) in render_file(path, platform, &ctx).await? {
                    let out = output_path(path, output_dir.as_deref(), platform);
                    if diff {
                        match diff_against_existing(&out, &text).await? {
                            Some(changes) => {
                                println!("--- {}", out.display());
                                print!("{changes}");
                            }
                            None => println!("{}: unchanged", out.display()),
                        }
                    }
                    write_output(&out, &text, config.write_checksums).await?;
                    info!("Rendered {} for {} to {}", path.display(), platform, out.display());
                }
            }
        }
        Commands::Check {
            policies,
            platform,
            config,
        } => {
            let config = load_config(config.as_deref()).await?;
            let ctx = RenderContext::from_config(&config);
            for path in &policies {
                let rendered = render_file(path, platform, &ctx).await?;
                let names: Vec<&str> = rendered.iter().map(|(p, _)| p.as_str()).collect();
                println!("{}: ok ({})", path.display(), names.join(", "));
            }
        }
        Commands::Tokens { platform } => {
            let registry = platform.generator().build_tokens();
            println!("{}", serde_json::to_string_pretty(&registry).map_err(Error::from)?);
        }
        Commands::Version => {
            println!("aclgen {}", build::PKG_VERSION);
            println!("commit: {}", build::SHORT_COMMIT);
            println!("built: {}", build::BUILD_TIME);
        }
    }
    Ok(())
}
