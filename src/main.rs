//! featurecode - Per-feature overrides for sliced G-code

#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::io::{self, Cursor, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use featurecode::parser::write_atomic;
use featurecode::{
    find_directive, parse_args, process_file, AliasTable, CliArgs, Config, ProcessError, Result,
};
use glob::Pattern;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// G-code file extensions to process (compared case-insensitively)
const GCODE_EXTENSIONS: &[&str] = &["gcode", "gco", "g"];

fn main() -> Result<ExitCode> {
    // Parse CLI arguments
    let args = parse_args();
    init_logging(&args);

    // Check if we should read from stdin
    let use_stdin =
        args.inputs.is_empty() || (args.inputs.len() == 1 && args.inputs[0].as_os_str() == "-");

    // If no inputs and running interactively, print usage; otherwise read from stdin
    if args.inputs.is_empty() && io::stdin().is_terminal() {
        print_usage();
        return Ok(ExitCode::SUCCESS);
    }

    let aliases = AliasTable::builtin();

    if use_stdin {
        // Process stdin - use current directory for config discovery
        let config = build_config(&args, None)?;
        process_stdin(&config, &aliases)?;
        return Ok(ExitCode::SUCCESS);
    }

    // Every input must exist before anything is touched
    if let Some(missing) = args.inputs.iter().find(|p| !p.exists()) {
        return Err(ProcessError::InputNotFound {
            path: missing.clone(),
        }
        .into());
    }

    // For explicit config files, we use one config for all files
    // For auto-discovery, each file may have its own config
    let use_per_file_config = args.config.is_none();
    let base_config = if use_per_file_config {
        None
    } else {
        Some(build_config(&args, None)?)
    };

    // Configure thread pool if --jobs specified
    if let Some(jobs) = args.jobs {
        if jobs > 0 {
            if let Err(e) = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build_global()
            {
                warn!("Failed to configure thread pool: {e}");
            }
        }
    }

    // Collect all files to process
    let files = collect_files(&args);

    if files.is_empty() {
        info!("No G-code files found to process.");
        return Ok(ExitCode::SUCCESS);
    }

    let use_sequential = args.stdout || args.jobs == Some(1);
    let errors = if use_sequential {
        process_files_sequential(&files, base_config.as_ref(), &aliases, &args)
    } else {
        process_files_parallel(&files, base_config.as_ref(), &aliases, &args)
    };

    Ok(if errors == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Install the tracing subscriber; `RUST_LOG` wins over `-D` / `-S`
fn init_logging(args: &CliArgs) {
    let default_level = if args.debug {
        "debug"
    } else if args.silent {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Build configuration from CLI args and optional config file
///
/// If `for_path` is provided and no explicit config file is specified,
/// uses auto-discovery to find config files in parent directories.
fn build_config(args: &CliArgs, for_path: Option<&Path>) -> Result<Config> {
    let mut config = if let Some(config_path) = &args.config {
        debug!("Using explicit config file: {}", config_path.display());
        Config::from_toml_file(config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else {
        let start = for_path.map_or_else(
            || std::env::current_dir().unwrap_or_default(),
            Path::to_path_buf,
        );
        let discovered = Config::discover_config_files(&start);
        if discovered.is_empty() {
            debug!("No config files discovered for: {}", start.display());
        } else {
            for f in &discovered {
                debug!("Discovered config file for {}: {}", start.display(), f.display());
            }
        }
        Config::from_discovered_files(&start)
    };

    // Override with CLI arguments
    if let Some(v) = args.wait_temp {
        config.wait_temp = v;
    }
    if let Some(v) = args.skip_first_layers {
        config.skip_first_layers = v;
    }
    if let Some(v) = args.flow_decimals {
        config.flow_decimals = v;
    }
    for (feature, overrides) in &args.features {
        overrides.apply(config.feature_mut(*feature));
    }

    log_config_debug(&config);

    // Validate configuration
    if let Some(message) = config.validate() {
        return Err(ProcessError::InvalidConfig(message).into());
    }

    Ok(config)
}

/// Log configuration values at debug level
fn log_config_debug(config: &Config) {
    debug!("Configuration:");
    debug!("  wait_temp: {}", config.wait_temp);
    debug!("  skip_first_layers: {}", config.skip_first_layers);
    debug!("  flow_decimals: {}", config.flow_decimals);
    for (feature, over) in &config.features {
        if !over.is_empty() {
            debug!("  {feature}: {over:?}");
        }
    }
}

/// Collect all files to process, handling directories and recursive flag
fn collect_files(args: &CliArgs) -> Vec<PathBuf> {
    // Compile exclude patterns
    let exclude_patterns: Vec<Pattern> = args
        .exclude
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!("Ignoring invalid exclude pattern {p:?}: {e}");
                None
            }
        })
        .collect();

    let custom_extensions = &args.extensions;
    let mut files = Vec::new();

    for input in &args.inputs {
        if input.is_file() {
            if !is_excluded(input, &exclude_patterns) {
                files.push(input.clone());
            }
        } else if input.is_dir() {
            if args.recursive {
                // WalkDir reports symlink loops as errors, which are skipped
                for entry in WalkDir::new(input)
                    .follow_links(true)
                    .max_depth(256)
                    .into_iter()
                    .filter_map(std::result::Result::ok)
                {
                    let path = entry.path();
                    if path.is_file()
                        && is_gcode_file(path, custom_extensions)
                        && !is_excluded(path, &exclude_patterns)
                    {
                        files.push(path.to_path_buf());
                    }
                }
            } else if let Ok(entries) = std::fs::read_dir(input) {
                // Non-recursive: only direct children
                for entry in entries.filter_map(std::result::Result::ok) {
                    let path = entry.path();
                    if path.is_file()
                        && is_gcode_file(&path, custom_extensions)
                        && !is_excluded(&path, &exclude_patterns)
                    {
                        files.push(path);
                    }
                }
            }
        }
    }

    files
}

/// Check if a path matches any exclusion pattern
fn is_excluded(path: &Path, patterns: &[Pattern]) -> bool {
    if patterns.is_empty() {
        return false;
    }

    let path_str = path.to_string_lossy();

    for pattern in patterns {
        // Match against full path
        if pattern.matches(&path_str) {
            return true;
        }

        // Match against file name only
        if let Some(file_name) = path.file_name() {
            if pattern.matches(&file_name.to_string_lossy()) {
                return true;
            }
        }

        // Match against each path component (for directory patterns)
        for component in path.components() {
            if let std::path::Component::Normal(c) = component {
                if pattern.matches(&c.to_string_lossy()) {
                    return true;
                }
            }
        }
    }

    false
}

/// Check if a file has a G-code extension, default or custom
fn is_gcode_file(path: &Path, custom_extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            GCODE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
                || custom_extensions.iter().any(|custom| {
                    custom
                        .strip_prefix('.')
                        .unwrap_or(custom)
                        .eq_ignore_ascii_case(ext)
                })
        })
}

/// Resolve the configuration for one file
fn config_for(path: &Path, base_config: Option<&Config>, args: &CliArgs) -> Result<Config> {
    match base_config {
        Some(config) => Ok(config.clone()),
        None => build_config(args, Some(path)),
    }
}

/// Process files sequentially (for stdout output); returns the error count
fn process_files_sequential(
    files: &[PathBuf],
    base_config: Option<&Config>,
    aliases: &AliasTable,
    args: &CliArgs,
) -> usize {
    let mut errors = 0;
    for path in files {
        let file_result = config_for(path, base_config, args)
            .and_then(|config| process_single_file(path, config, aliases, args));

        if let Err(e) = file_result {
            errors += 1;
            error!("Error processing {}: {e:#}", path.display());
        }
    }
    errors
}

/// Process files in parallel using Rayon; returns the error count
fn process_files_parallel(
    files: &[PathBuf],
    base_config: Option<&Config>,
    aliases: &AliasTable,
    args: &CliArgs,
) -> usize {
    let success_count = AtomicUsize::new(0);
    let error_count = AtomicUsize::new(0);

    files.par_iter().for_each(|path| {
        let file_result = config_for(path, base_config, args)
            .and_then(|config| process_single_file(path, config, aliases, args));

        match file_result {
            Ok(()) => {
                success_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error_count.fetch_add(1, Ordering::Relaxed);
                error!("Error processing {}: {e:#}", path.display());
            }
        }
    });

    let success = success_count.load(Ordering::Relaxed);
    let errors = error_count.load(Ordering::Relaxed);

    if errors == 0 {
        info!("Processed {success} files successfully.");
    } else {
        info!("Processed {success} files, {errors} errors.");
    }
    errors
}

/// Apply directive overrides from file contents to a configuration
fn apply_directive_overrides(config: &mut Config, contents: &[u8], source_name: &str) -> Result<()> {
    if let Some(overrides) = find_directive(&mut Cursor::new(contents)) {
        debug!("Found file directive in {source_name}");
        overrides.apply(config);
        if let Some(message) = config.validate() {
            return Err(ProcessError::InvalidConfig(format!("{source_name}: {message}")).into());
        }
    }
    Ok(())
}

/// Process a single file
fn process_single_file(
    path: &Path,
    mut config: Config,
    aliases: &AliasTable,
    args: &CliArgs,
) -> Result<()> {
    // Read input file into memory
    let contents = std::fs::read(path).map_err(|source| ProcessError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path.to_string_lossy();

    apply_directive_overrides(&mut config, &contents, &name)?;

    // The whole document is rewritten before anything is written
    let mut output = Vec::with_capacity(contents.len());
    process_file(
        Cursor::new(contents.as_slice()),
        &mut output,
        &config,
        aliases,
        &name,
    )?;

    if args.stdout {
        io::stdout().lock().write_all(&output)?;
    } else {
        write_atomic(path, &output)?;
    }

    Ok(())
}

/// Process input from stdin, output to stdout
fn process_stdin(config: &Config, aliases: &AliasTable) -> Result<()> {
    // Read all input from stdin
    let mut stdin_contents = Vec::new();
    io::stdin().read_to_end(&mut stdin_contents)?;

    // Make a copy of config that can be overridden by directives
    let mut file_config = config.clone();
    apply_directive_overrides(&mut file_config, &stdin_contents, "stdin")?;

    let mut output = Vec::with_capacity(stdin_contents.len());
    process_file(
        Cursor::new(stdin_contents.as_slice()),
        &mut output,
        &file_config,
        aliases,
        "stdin",
    )?;

    // Always output to stdout when reading from stdin
    io::stdout().lock().write_all(&output)?;

    Ok(())
}

fn print_usage() {
    println!(
        "featurecode v{} - per-feature overrides for sliced G-code",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("Usage:");
    println!("  featurecode [OPTIONS] <FILE>...");
    println!("  featurecode [OPTIONS] -r <DIRECTORY>");
    println!("  featurecode [OPTIONS] -              # Read from stdin");
    println!("  cat part.gcode | featurecode         # Pipe input");
    println!();
    println!("Examples:");
    println!("  featurecode --bridge 200 --bridge-fan 100 part.gcode");
    println!("  featurecode --top-surface-flow 0.95 --skip-first-layers 1 part.gcode");
    println!("  featurecode --support-interface-gcode 'M204 S500' \\");
    println!("              --support-interface-gcode-exit 'M204 S1000' part.gcode");
    println!("  featurecode -r -e 'archive' prints/  # Rewrite a directory tree");
    println!("  featurecode --stdout part.gcode      # Output to stdout");
    println!();
    println!("Global options:");
    println!("  --wait-temp                     Use M109 (wait) for injected temperatures");
    println!("  --skip-first-layers <NUM>       Leave leading layers untouched [default: 0]");
    println!("  --flow-decimals <NUM>           Digits of rewritten E values [default: 5]");
    println!("  -c, --config <FILE>             Config file path (overrides auto-discovery)");
    println!("  -r, --recursive                 Process directories recursively");
    println!("  -e, --exclude <PATTERN>         Exclude files/dirs matching pattern (repeatable)");
    println!("  -x, --extension <EXT>           Additional G-code extension (repeatable)");
    println!("  -j, --jobs <NUM>                Parallel jobs (0=auto, 1=sequential)");
    println!("  -s, --stdout                    Output to stdout");
    println!("  -D, --debug                     Enable debug output");
    println!("  -S, --silent                    Errors only");
    println!("  -h, --help                      Print help, including every feature option");
    println!();
    println!("Feature options (for each feature):");
    println!("  --<feature> <TEMP>              Nozzle temperature");
    println!("  --<feature>-fan <PCT>           Fan level in percent");
    println!("  --<feature>-flow <FACTOR>       Flow factor");
    println!("  --<feature>-gcode <CMD>         Command on entering the feature (repeatable)");
    println!("  --<feature>-gcode-exit <CMD>    Command on leaving the feature (repeatable)");
    println!();
    println!("Features:");
    for feature in featurecode::Feature::ALL {
        println!("  {:<24}{}", feature.cli_name(), feature.label());
    }
    println!();
    println!("Supported extensions: .gcode, .gco, .g (case-insensitive)");
    println!();
    println!("Config file auto-discovery:");
    println!("  Searches for featurecode.toml in parent directories");
    println!("  starting from the file being processed up to the root directory.");
    println!("  Also checks featurecode.toml in the home directory.");
    println!("  More specific configs (closer to file) override less specific ones.");
}
