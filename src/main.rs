use clap::{CommandFactory, Parser};
use coderefs::cli::{Cli, Commands, ScanArgs};
use coderefs::config::{self, Config, ProjectConfig};
use coderefs::error::{CodeRefsError, Result};
use coderefs::{
    CancelToken, FinderOptions, SearchLimits, build_matcher, filter_short_flag_keys,
    output, scan,
};
use colored::*;
use env_logger::{Builder, Env, Target};
use indicatif::{ProgressBar, ProgressStyle};
use is_terminal::IsTerminal;
use log::{info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    match cli.command {
        Commands::Scan(args) => run_scan(args),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "coderefs", &mut io::stdout());
            Ok(())
        }
    }
}

fn setup_logging(cli: &Cli) -> Result<()> {
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_filter));

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    if let Some(log_path) = &cli.log {
        if let Some(parent_dir) = log_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                fs::create_dir_all(parent_dir)?;
            }
        }
        let log_file = fs::File::create(log_path)?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder
        .try_init()
        .map_err(|e| CodeRefsError::Other(e.to_string()))?;
    Ok(())
}

/// Projects from the config file, the flags file and `--flag`, merged by key.
fn collect_projects(args: &ScanArgs, config: &Config) -> Result<Vec<ProjectConfig>> {
    let mut projects = config.projects.clone();

    let mut extra: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(path) = &args.flags_file {
        let content = fs::read_to_string(path).map_err(|source| CodeRefsError::FileRead {
            path: path.clone(),
            source,
        })?;
        let from_file: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)?;
        extra.extend(from_file);
    }
    if !args.flags.is_empty() {
        extra
            .entry(args.project_key.clone())
            .or_default()
            .extend(args.flags.iter().cloned());
    }

    for (key, flags) in extra {
        match projects.iter_mut().find(|p| p.key == key) {
            Some(project) => project.flags.extend(flags),
            None => projects.push(ProjectConfig {
                key,
                dir: None,
                flags,
            }),
        }
    }

    for project in &mut projects {
        let (kept, dropped) = filter_short_flag_keys(std::mem::take(&mut project.flags));
        if !dropped.is_empty() {
            warn!(
                "Project {}: ignoring flag keys shorter than {} characters: {}",
                project.key,
                config::MIN_FLAG_KEY_LENGTH,
                dropped.join(", ")
            );
        }
        let mut seen = std::collections::HashSet::new();
        project.flags = kept.into_iter().filter(|k| seen.insert(k.clone())).collect();
    }
    projects.retain(|p| !p.flags.is_empty());
    Ok(projects)
}

fn run_scan(args: ScanArgs) -> Result<()> {
    let start_time = Instant::now();
    let mut config = Config::load(args.config.as_deref(), &args.dir)?;

    let ctx_lines = args.context_lines.unwrap_or(config.context_lines);
    config::validate_context_lines(ctx_lines)?;
    if args.no_default_delimiters {
        config.delimiters.disable_defaults = true;
    }
    if let Some(extra) = &args.delimiters {
        config
            .delimiters
            .additional
            .extend(extra.chars().map(String::from));
    }
    let delimiters = config.resolved_delimiters();
    let backend = args.backend.unwrap_or(config.backend);

    let projects = collect_projects(&args, &config)?;
    if projects.is_empty() {
        return Err(CodeRefsError::Config(
            "no flag keys to search for; pass --flag, --flags-file or configure projects"
                .to_string(),
        ));
    }

    let matcher = build_matcher(&projects, &delimiters, &config.aliases, &args.dir, ctx_lines)?;
    info!(
        "Scanning {} for {} flags in {} projects with the {backend} backend",
        args.dir.display(),
        matcher.flag_count(),
        projects.len()
    );

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .map_err(|e| CodeRefsError::Other(format!("failed to install Ctrl-C handler: {e}")))?;

    let pb = if io::stderr().is_terminal() {
        let pb = ProgressBar::new_spinner().with_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .map_err(|e| CodeRefsError::Other(e.to_string()))?
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message(format!("Scanning {}", args.dir.display()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    } else {
        ProgressBar::hidden()
    };

    let options = FinderOptions {
        subdir: args.subdir.clone(),
        limits: SearchLimits::default(),
        max_pattern_length: config.max_pattern_length,
    };
    let report = scan(&args.dir, &matcher, backend, options, &cancel);
    pb.finish_and_clear();
    let report = report?;

    if cancel.is_cancelled() {
        return Err(CodeRefsError::Other("scan cancelled".to_string()));
    }
    if let Some(limit) = report.limit_reached {
        warn!("Search limit reached ({limit}); results are truncated");
    }
    for project in &report.failed_projects {
        warn!("Project {project} was skipped: no valid search pattern could be built for its flags");
    }

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(fs::File::create(path)?);
            output::write_report(args.format, &report.references, &mut writer)?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            output::write_report(args.format, &report.references, &mut writer)?;
        }
    }

    let flags_found: std::collections::BTreeSet<&str> = report
        .references
        .iter()
        .flat_map(|r| r.hunks.iter().map(|h| h.flag_key.as_str()))
        .collect();
    eprintln!(
        "\n{} {} {} {} {} {} {}",
        "Found".green(),
        report.hunk_count(),
        "hunks in".green(),
        report.references.len(),
        "files for".green(),
        flags_found.len(),
        "flags".green()
    );
    info!("Scan finished in {:.2?}", start_time.elapsed());
    Ok(())
}
