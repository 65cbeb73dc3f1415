// macrohost CLI - run Lua macros headlessly, inspect the script API,
// query completions and request inline suggestions

mod exit_codes;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};

use macrohost_assist::{
    backend_from_config, prefix_at, CompletionProvider, EditorBuffer, SuggestionAction, SuggestionBackend,
    SuggestionDispatcher, SuggestionEngine, SuggestionRequestError, SuggestionState, TemplateBackend,
};
use macrohost_config::{BusyPolicy, ResolvedAIConfig, Settings};
use macrohost_core::registry::DocFormat;
use macrohost_core::{
    ui_channel, ApiRegistry, Document, DocumentCell, DocumentProxy, HostLog, RegistryBuilder, RegistryConfig, UiEvent,
};
use macrohost_io::csv as delimited;
use macrohost_io::table::process;
use macrohost_scripting::{ScriptEngine, ScriptExecutionResult, ScriptRuntimeError, ScriptSource};

use exit_codes::{
    script_exit_code, suggestion_exit_code, EXIT_ERROR, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "mhost")]
#[command(about = "Lua macro host (headless): run scripts, inspect the API, completions and AI suggestions")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file [default: <config dir>/macrohost/settings.json]
    #[arg(long, global = true, env = "MACROHOST_SETTINGS")]
    settings: Option<PathBuf>,

    /// Extra script directory, searched before the configured ones (repeatable)
    #[arg(long = "script-dir", global = true)]
    script_dirs: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Lua script, optionally against a document
    #[command(after_help = "\
Examples:
  mhost run cleanup.lua --doc notes.txt --save
  mhost run cleanup --script-dir ./macros
  mhost run report.lua --json | jq .output")]
    Run {
        /// Script file, or a script name looked up in the search directories
        script: String,

        /// Document exposed to the script as host.active_doc / doc
        #[arg(long)]
        doc: Option<PathBuf>,

        /// Save the document after a successful run
        #[arg(long, requires = "doc")]
        save: bool,

        /// Fail instead of waiting when another run holds the document
        #[arg(long)]
        reject_busy: bool,

        /// Print the host log to stderr after the run
        #[arg(long)]
        show_log: bool,

        /// Print the run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print completion candidates for a prefix
    #[command(after_help = "\
Examples:
  mhost complete host.
  mhost complete 'local t = data.lo' --at 17 --detail")]
    Complete {
        /// Prefix to complete (or the full line when --at is given)
        prefix: String,

        /// Treat PREFIX as editor text and complete at this byte offset
        #[arg(long)]
        at: Option<usize>,

        /// Show kind and signature next to each candidate
        #[arg(long)]
        detail: bool,

        /// Print candidates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the script API catalogue
    Api {
        #[arg(long, value_enum, default_value = "markdown")]
        format: ApiFormat,
    },

    /// Load a delimited file the way data.load_csv does and summarize it
    #[command(after_help = "\
Examples:
  mhost table sales.csv
  mhost table export.tsv --delimiter '\\t' --process --json
  mhost table raw.csv --process -o clean.csv")]
    Table {
        file: PathBuf,

        /// Field delimiter [default: sniffed from the first lines]
        #[arg(long, short = 'd')]
        delimiter: Option<String>,

        /// Trim values, drop blank rows and convert columns to inferred types
        #[arg(long)]
        process: bool,

        /// Write the (processed) table as CSV
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Number of rows to preview
        #[arg(long, default_value_t = 5)]
        preview: usize,

        #[arg(long)]
        json: bool,
    },

    /// Request one inline suggestion and print the ghost text
    #[command(after_help = "\
Examples:
  mhost suggest explain --selection snippet.lua --offline
  mhost suggest fix --selection broken.lua --error \"attempt to index a nil value\"
  mhost suggest suggest --selection draft.lua --apply")]
    Suggest {
        action: ActionArg,

        /// File whose contents are the selection (cursor at end for `suggest`)
        #[arg(long)]
        selection: Option<PathBuf>,

        /// Error message to fix (only with `fix`)
        #[arg(long)]
        error: Option<String>,

        /// Use the offline template backend regardless of settings
        #[arg(long)]
        offline: bool,

        /// Accept the suggestion and print the resulting buffer
        #[arg(long)]
        apply: bool,
    },

    /// Show effective settings and AI configuration
    Doctor {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ApiFormat {
    Markdown,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ActionArg {
    Suggest,
    Optimize,
    Explain,
    Fix,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("MHOST_GIT_HASH"),
        ")",
        "\nlua:     5.4 (vendored)",
        "\ntarget:  ",
        env!("MHOST_TARGET"),
    )
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = load_host(cli.settings.as_deref(), cli.script_dirs).and_then(|host| match cli.command {
        Commands::Run { script, doc, save, reject_busy, show_log, json } => {
            cmd_run(&host, &script, doc, save, reject_busy, show_log, json)
        }
        Commands::Complete { prefix, at, detail, json } => cmd_complete(&host, &prefix, at, detail, json),
        Commands::Api { format } => cmd_api(&host, format),
        Commands::Table { file, delimiter, process, output, preview, json } => {
            cmd_table(&file, delimiter.as_deref(), process, output.as_deref(), preview, json)
        }
        Commands::Suggest { action, selection, error, offline, apply } => {
            cmd_suggest(&host, action, selection.as_deref(), error, offline, apply)
        }
        Commands::Doctor { json } => cmd_doctor(&host, json),
    });

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn script(err: ScriptRuntimeError) -> Self {
        let hint = match &err {
            ScriptRuntimeError::NotFound { .. } => Some("pass a file path, or add --script-dir".to_string()),
            ScriptRuntimeError::Failed { result, .. } if result.timed_out || result.instruction_limit_exceeded => {
                Some("raise scripting.timeoutSecs / scripting.instructionLimit in settings.json".to_string())
            }
            _ => None,
        };
        Self { code: script_exit_code(&err), message: err.to_string(), hint }
    }

    pub fn suggestion(err: SuggestionRequestError) -> Self {
        let hint = match &err {
            SuggestionRequestError::NotConfigured(_) => {
                Some("set ai.provider in settings.json, or pass --offline".to_string())
            }
            SuggestionRequestError::MissingKey(var) => Some(format!("export {}=<key>", var)),
            _ => None,
        };
        Self { code: suggestion_exit_code(&err), message: err.to_string(), hint }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// Host setup
// ============================================================================

struct Host {
    settings: Settings,
    /// File the settings were read from: `--settings`, or the default location.
    settings_path: PathBuf,
    registry: Arc<ApiRegistry>,
    log: HostLog,
}

fn load_host(settings_path: Option<&Path>, extra_dirs: Vec<PathBuf>) -> Result<Host, CliError> {
    let (settings, settings_path) = match settings_path {
        Some(path) if !path.exists() => {
            return Err(CliError::io(format!("settings file not found: {}", path.display())));
        }
        Some(path) => (Settings::load_from(path), path.to_path_buf()),
        None => (Settings::load(), Settings::config_path()),
    };

    let mut script_dirs = extra_dirs;
    script_dirs.extend(settings.effective_script_dirs());
    let config = RegistryConfig { script_dirs, ..Default::default() };
    let mut builder = RegistryBuilder::standard(config).map_err(|e| CliError::general(e.to_string()))?;
    for name in &settings.disabled_namespaces {
        builder.set_enabled(name, false).map_err(|e| {
            CliError::usage(format!("scripting.disabledNamespaces: {}", e))
                .with_hint(format!("check {}", settings_path.display()))
        })?;
    }
    let registry = builder.build();

    let log = if settings.log_to_file {
        HostLog::with_file_sink(settings.effective_log_dir(), settings.log_retention_days).unwrap_or_else(|e| {
            log::warn!("host log file disabled: {}", e);
            HostLog::new()
        })
    } else {
        HostLog::new()
    };

    Ok(Host { settings, settings_path, registry: Arc::new(registry), log })
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(
    host: &Host,
    script: &str,
    doc: Option<PathBuf>,
    save: bool,
    reject_busy: bool,
    show_log: bool,
    json: bool,
) -> Result<(), CliError> {
    let (ui, ui_rx) = ui_channel();
    let documents = DocumentProxy::new();
    let mut engine =
        ScriptEngine::new(host.registry.clone(), documents.clone(), host.log.clone(), ui).with_settings(&host.settings);
    if reject_busy {
        engine = engine.with_busy_policy(BusyPolicy::Reject);
    }

    let cell = match doc {
        Some(path) => {
            let document = if path.exists() {
                Document::open(&path).map_err(|e| CliError::io(e.to_string()))?
            } else {
                Document::with_content("", Some(path))
            };
            let cell = DocumentCell::new(document);
            documents.activate(&cell);
            Some(cell)
        }
        None => None,
    };

    let script_path = Path::new(script);
    let source = if script_path.is_file() {
        ScriptSource::from_file(script_path)
    } else {
        engine.resolve(script)
    }
    .map_err(CliError::script)?;

    let outcome = engine.run(source);
    drain_ui_events(&ui_rx);
    if show_log {
        for entry in host.log.entries() {
            eprintln!("{}", entry.format_line());
        }
    }

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            if let Some(partial) = err.result() {
                print_run_result(partial, json)?;
            }
            return Err(CliError::script(err));
        }
    };
    print_run_result(&result, json)?;

    if save {
        if let Some(cell) = &cell {
            cell.write(|d| d.save()).map_err(|e| CliError::io(e.to_string()))?;
            eprintln!("saved {}", cell.read(|d| d.display_name()));
        }
    }
    Ok(())
}

fn drain_ui_events(rx: &Receiver<UiEvent>) {
    for event in rx.try_iter() {
        match event {
            UiEvent::Message { text, title } => eprintln!("[{}] {}", title, text),
            UiEvent::Status(text) => eprintln!("status: {}", text),
        }
    }
}

fn print_run_result(result: &ScriptExecutionResult, json: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        let text = serde_json::to_string_pretty(result).map_err(|e| CliError::general(e.to_string()))?;
        writeln!(out, "{}", text).map_err(|e| CliError::io(e.to_string()))?;
        return Ok(());
    }
    for line in &result.output {
        writeln!(out, "{}", line).map_err(|e| CliError::io(e.to_string()))?;
    }
    if let Some(value) = &result.returned {
        writeln!(out, "=> {}", value).map_err(|e| CliError::io(e.to_string()))?;
    }
    if result.output_truncated {
        eprintln!("(output truncated)");
    }
    Ok(())
}

// ============================================================================
// complete
// ============================================================================

fn cmd_complete(host: &Host, prefix: &str, at: Option<usize>, detail: bool, json: bool) -> Result<(), CliError> {
    let prefix = match at {
        Some(offset) if offset > prefix.len() => {
            return Err(CliError::usage(format!("--at {} is past the end of the text ({} bytes)", offset, prefix.len())));
        }
        Some(offset) => match prefix_at(prefix, offset) {
            Some(p) => p,
            // Inside a string or comment: nothing to offer
            None => return Ok(()),
        },
        None => prefix,
    };

    let items = CompletionProvider::new(host.registry.clone()).complete_items(prefix);
    if json {
        let text = serde_json::to_string_pretty(&items).map_err(|e| CliError::general(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }
    for item in items {
        if detail {
            println!("{}\t{}\t{}", item.label, item.kind.as_str(), item.detail.unwrap_or_default());
        } else {
            println!("{}", item.label);
        }
    }
    Ok(())
}

// ============================================================================
// api
// ============================================================================

fn cmd_api(host: &Host, format: ApiFormat) -> Result<(), CliError> {
    let format = match format {
        ApiFormat::Markdown => DocFormat::Markdown,
        ApiFormat::Json => DocFormat::Json,
    };
    let docs = host.registry.render_docs(format).map_err(CliError::general)?;
    println!("{}", docs.trim_end());
    Ok(())
}

// ============================================================================
// table
// ============================================================================

fn parse_delimiter(s: &str) -> Result<u8, CliError> {
    match s {
        "\\t" | "tab" => Ok(b'\t'),
        _ if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        _ => Err(CliError::usage(format!("invalid delimiter: {:?}", s)).with_hint("use a single ASCII character or \\t")),
    }
}

fn cmd_table(
    file: &Path,
    delimiter: Option<&str>,
    process_rows: bool,
    output: Option<&Path>,
    preview: usize,
    json: bool,
) -> Result<(), CliError> {
    if !file.exists() {
        return Err(CliError::io(format!("file not found: {}", file.display())));
    }
    let table = match delimiter {
        Some(d) => {
            let delimiter = parse_delimiter(d)?;
            let content = delimited::read_file_as_utf8(file).map_err(CliError::io)?;
            delimited::load_delimited(&content, delimiter)
        }
        None => delimited::load_sniffed(file),
    }
    .map_err(CliError::general)?;
    let table = if process_rows { process(&table) } else { table };

    if let Some(path) = output {
        delimited::write_csv(&table, path).map_err(CliError::io)?;
    }

    if json {
        let columns: Vec<_> = table
            .columns()
            .iter()
            .map(|c| serde_json::json!({ "name": c.name, "type": c.ty.as_str() }))
            .collect();
        let rows: Vec<_> = table.rows().iter().map(|r| r.values()).collect();
        let report = serde_json::json!({
            "row_count": table.row_count(),
            "column_count": table.column_count(),
            "columns": columns,
            "rows": rows,
        });
        let text = serde_json::to_string_pretty(&report).map_err(|e| CliError::general(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    println!("{} rows x {} columns", table.row_count(), table.column_count());
    for column in table.columns() {
        println!("  {:<20} {}", column.name, column.ty.as_str());
    }
    for row in table.rows().iter().take(preview) {
        let cells: Vec<String> = row.values().iter().map(|v| v.to_string()).collect();
        println!("  | {}", cells.join(" | "));
    }
    if table.row_count() > preview {
        println!("  ... {} more", table.row_count() - preview);
    }
    Ok(())
}

// ============================================================================
// suggest
// ============================================================================

fn cmd_suggest(
    host: &Host,
    action: ActionArg,
    selection: Option<&Path>,
    error: Option<String>,
    offline: bool,
    apply: bool,
) -> Result<(), CliError> {
    if error.is_some() && action != ActionArg::Fix {
        return Err(CliError::usage("--error only applies to `fix`"));
    }
    let action = match action {
        ActionArg::Suggest => SuggestionAction::Suggest,
        ActionArg::Optimize => SuggestionAction::Optimize,
        ActionArg::Explain => SuggestionAction::Explain,
        ActionArg::Fix => SuggestionAction::Fix { error },
    };

    let text = match selection {
        Some(path) => fs::read_to_string(path).map_err(|e| CliError::io(format!("{}: {}", path.display(), e)))?,
        None => String::new(),
    };
    let mut buffer = EditorBuffer::with_text(&text);
    if action != SuggestionAction::Suggest {
        buffer.select(0..buffer.len());
    }

    let config = ResolvedAIConfig::from_settings(&host.settings.ai);
    let backend: Arc<dyn SuggestionBackend> = if offline {
        Arc::new(TemplateBackend::new(host.registry.clone()))
    } else {
        backend_from_config(&config, host.registry.clone()).map_err(CliError::suggestion)?
    };
    log::info!("suggestion backend: {}", backend.name());

    let dispatcher = SuggestionDispatcher::new(backend);
    let mut engine = SuggestionEngine::new(buffer.id(), host.log.clone()).with_timeout(config.request_timeout);
    let request = engine.trigger(&buffer, action, Instant::now());
    dispatcher.dispatch(request).map_err(CliError::suggestion)?;

    while matches!(engine.state(), SuggestionState::Requesting { .. }) {
        if let Some(response) = dispatcher.recv_timeout(Duration::from_millis(100)) {
            engine.on_response(response);
        }
        engine.check_timeout(Instant::now());
    }

    let ghost = match engine.ghost() {
        Some(ghost) => ghost.text.clone(),
        None => {
            return Err(match engine.last_outcome() {
                Some(SuggestionState::Failed { error, .. }) => CliError::suggestion(error.clone()),
                other => CliError::general(format!(
                    "suggestion ended without a result ({})",
                    other.map(|s| s.name()).unwrap_or("idle")
                )),
            });
        }
    };

    if apply {
        engine.accept(&mut buffer);
        print!("{}", buffer.text());
        if !buffer.text().ends_with('\n') {
            println!();
        }
    } else {
        println!("{}", ghost.trim_end());
    }
    Ok(())
}

// ============================================================================
// doctor
// ============================================================================

fn cmd_doctor(host: &Host, json: bool) -> Result<(), CliError> {
    let config = ResolvedAIConfig::from_settings(&host.settings.ai);
    let script_dirs: Vec<String> =
        host.registry.config().script_dirs.iter().map(|d| d.display().to_string()).collect();
    let disabled: Vec<&str> =
        host.registry.namespaces().iter().filter(|ns| !ns.enabled).map(|ns| ns.name.as_str()).collect();

    if json {
        let report = serde_json::json!({
            "schema_version": 1,
            "version": env!("CARGO_PKG_VERSION"),
            "settings_path": host.settings_path.display().to_string(),
            "script_dirs": script_dirs,
            "disabled_namespaces": disabled,
            "busy_policy": host.settings.busy_policy,
            "timeout_secs": host.settings.script_timeout_secs,
            "ai": {
                "provider": config.provider_name(),
                "status": config.status.as_str(),
                "model": config.model,
                "endpoint": config.endpoint,
                "privacy_mode": config.privacy_mode,
                "key_source": config.key_source.as_str(),
                "blocking_reason": config.blocking_reason,
            },
        });
        let text = serde_json::to_string_pretty(&report).map_err(|e| CliError::general(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    println!("mhost {}", env!("CARGO_PKG_VERSION"));
    println!("settings:     {}", host.settings_path.display());
    println!("script dirs:  {}", script_dirs.join(", "));
    if !disabled.is_empty() {
        println!("disabled:     {}", disabled.join(", "));
    }
    println!("busy policy:  {:?}", host.settings.busy_policy);
    println!("timeout:      {}s", host.settings.script_timeout_secs);
    println!();
    print!("{}", config);
    Ok(())
}
