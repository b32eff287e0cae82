use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use qcoder::pipeline::PENDING_LABEL;
use qcoder::prompt::TEXT_PLACEHOLDER;
use qcoder::{
    BatchRunner, ConfigError, Dataset, DatasetError, LlmError, Mode, RunError, RunRequest,
    Settings,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// qcoder - assign qualitative codes to text snippets with a language model
#[derive(Parser)]
#[command(name = "qcoder")]
#[command(about = "Batch qualitative coding of text snippets with a language model")]
#[command(version)]
struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file to use instead of the default location
    #[arg(long = "config", value_name = "FILE", global = true)]
    settings_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Code every text in a dataset workbook
    Run(RunCommand),
    /// Print the editable prompt template for a dataset
    Prompt(PromptCommand),
    /// Show or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Code a dataset
#[derive(Parser)]
struct RunCommand {
    /// Dataset workbook with "Coding Results" and "code" sheets
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Directory for the results workbook
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// calibrate (compare with human codes) or encode
    #[arg(short, long, default_value = "calibrate")]
    mode: Mode,

    /// Prompt template file; must contain [TEXT]
    #[arg(short, long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Print each prompt as it is sent
    #[arg(long)]
    show_prompts: bool,

    #[command(flatten)]
    overrides: SettingsArgs,
}

/// Print the prompt template
#[derive(Parser)]
struct PromptCommand {
    /// Dataset workbook
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Write the template to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved settings with the API key masked
    Show,
    /// Save the given values to the settings file
    Set(SettingsArgs),
}

/// Endpoint and pacing values that override saved settings
#[derive(Args, Debug, Default, Clone)]
struct SettingsArgs {
    /// API base URL, e.g. https://api.openai.com
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// API key
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Per-item timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Delay after each item in seconds
    #[arg(long, value_name = "SECS")]
    delay: Option<f64>,
}

impl SettingsArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(url) = &self.endpoint {
            settings.api_base_url = url.clone();
        }
        if let Some(key) = &self.api_key {
            settings.api_key = key.clone();
        }
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = timeout;
        }
        if let Some(delay) = self.delay {
            settings.delay_secs = delay;
        }
    }

    fn is_empty(&self) -> bool {
        self.endpoint.is_none()
            && self.api_key.is_none()
            && self.model.is_none()
            && self.timeout.is_none()
            && self.delay.is_none()
    }
}

/// Callback payloads forwarded from the worker thread.
#[derive(Debug, Clone, PartialEq)]
enum RunEvent {
    Progress {
        current: usize,
        total: usize,
    },
    Preview {
        prompt: String,
        human: String,
        model: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = settings_path(cli.settings_file.as_deref()).and_then(|path| match &cli.command {
        Commands::Run(cmd) => handle_run(cmd, &path),
        Commands::Prompt(cmd) => handle_prompt(cmd),
        Commands::Config { action } => handle_config(action, &path),
    });

    if let Err(e) = result {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Bad input or configuration is the user's to fix; everything else is internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<DatasetError>()
            || cause.is::<ConfigError>()
            || matches!(
                cause.downcast_ref::<LlmError>(),
                Some(LlmError::InvalidUrl(_) | LlmError::MissingSetting(_))
            )
            || matches!(cause.downcast_ref::<RunError>(), Some(RunError::Dataset(_)))
            || cause
                .downcast_ref::<std::io::Error>()
                .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
    })
}

fn settings_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(Settings::default_path()?),
    }
}

fn handle_run(cmd: &RunCommand, settings_path: &Path) -> Result<()> {
    let mut settings = Settings::load(settings_path)?;
    cmd.overrides.apply(&mut settings);
    settings.validate()?;

    let client = settings
        .build_client()
        .context("Failed to configure the API client")?;
    let template = cmd.template.as_deref().map(read_template).transpose()?;

    let request = RunRequest {
        input: cmd.input.clone(),
        output_dir: cmd.output.clone(),
        mode: cmd.mode,
        template,
    };
    let mut runner = BatchRunner::new(Arc::new(client), settings.run_options());

    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        let progress_tx = tx.clone();
        runner.run(
            &request,
            |current, total| {
                let _ = progress_tx.send(RunEvent::Progress { current, total });
            },
            |prompt, human, model| {
                let _ = tx.send(RunEvent::Preview {
                    prompt: prompt.to_string(),
                    human: human.to_string(),
                    model: model.to_string(),
                });
            },
        )
    });

    for event in rx {
        if let Some(line) = render_event(&event, cmd.show_prompts) {
            println!("{line}");
        }
    }

    let outcome = worker
        .join()
        .map_err(|_| anyhow::anyhow!("Coding run panicked"))?;

    match outcome {
        Ok(summary) => {
            println!();
            for line in summary.report_lines() {
                println!("{line}");
            }
            Ok(())
        }
        Err(e) => {
            if let Some(unsaved) = e.unsaved_summary() {
                eprintln!(
                    "{} of {} texts were coded but the results could not be saved",
                    unsaved.processed, unsaved.total
                );
            }
            Err(e.into())
        }
    }
}

/// Formats one worker event for the terminal; pending previews print only the prompt.
fn render_event(event: &RunEvent, show_prompts: bool) -> Option<String> {
    match event {
        RunEvent::Progress { current, total } => Some(format!("[{current}/{total}] coding...")),
        RunEvent::Preview { prompt, model, .. } if model == PENDING_LABEL => {
            show_prompts.then(|| format!("{prompt}\n"))
        }
        RunEvent::Preview { human, model, .. } => {
            Some(format!("        human: {human:<6} model: {model}"))
        }
    }
}

fn read_template(path: &Path) -> Result<String> {
    let template = fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt template: {}", path.display()))?;
    if !template.trim().is_empty() && !template.contains(TEXT_PLACEHOLDER) {
        warn!(
            "template {} has no {TEXT_PLACEHOLDER} placeholder; every item will fail",
            path.display()
        );
    }
    Ok(template)
}

fn handle_prompt(cmd: &PromptCommand) -> Result<()> {
    let dataset = Dataset::load(&cmd.input)?;
    let template = dataset.prompt_template();

    match &cmd.out {
        Some(path) => {
            fs::write(path, &template)
                .with_context(|| format!("Failed to write prompt template: {}", path.display()))?;
            println!("Prompt template written to {}", path.display());
        }
        None => print!("{template}"),
    }
    Ok(())
}

fn handle_config(action: &ConfigAction, settings_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = Settings::load(settings_path)?;
            for line in describe_settings(&settings, settings_path) {
                println!("{line}");
            }
        }
        ConfigAction::Set(args) => {
            if args.is_empty() {
                anyhow::bail!("Nothing to save: pass at least one setting flag");
            }
            let mut settings = Settings::load_file(settings_path)?;
            args.apply(&mut settings);
            settings.save(settings_path)?;
            println!("Settings saved to {}", settings_path.display());
        }
    }
    Ok(())
}

fn describe_settings(settings: &Settings, path: &Path) -> Vec<String> {
    let or_unset = |value: &str| {
        if value.trim().is_empty() {
            "(not set)".to_string()
        } else {
            value.to_string()
        }
    };
    vec![
        format!("Settings file: {}", path.display()),
        format!("API base URL:  {}", or_unset(&settings.api_base_url)),
        format!("API key:       {}", or_unset(&settings.masked_api_key())),
        format!("Model:         {}", or_unset(&settings.model)),
        format!("Timeout:       {}s", settings.timeout_secs),
        format!("Delay:         {}s", settings.delay_secs),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_given_values() {
        let mut settings = Settings {
            api_base_url: "https://saved.example.com".into(),
            api_key: "saved-key".into(),
            ..Settings::default()
        };
        let args = SettingsArgs {
            model: Some("gpt-4o".into()),
            delay: Some(0.0),
            ..SettingsArgs::default()
        };

        args.apply(&mut settings);

        assert_eq!(settings.api_base_url, "https://saved.example.com");
        assert_eq!(settings.api_key, "saved-key");
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.delay_secs, 0.0);
        assert_eq!(settings.timeout_secs, 10.0);
    }

    #[test]
    fn empty_overrides_are_detected() {
        assert!(SettingsArgs::default().is_empty());
        let args = SettingsArgs {
            timeout: Some(5.0),
            ..SettingsArgs::default()
        };
        assert!(!args.is_empty());
    }

    #[test]
    fn pending_previews_are_hidden_unless_requested() {
        let pending = RunEvent::Preview {
            prompt: "Text to code: hi".into(),
            human: "a".into(),
            model: PENDING_LABEL.into(),
        };
        assert_eq!(render_event(&pending, false), None);
        assert_eq!(
            render_event(&pending, true),
            Some("Text to code: hi\n".to_string())
        );
    }

    #[test]
    fn resolved_previews_and_progress_are_printed() {
        let done = RunEvent::Preview {
            prompt: "p".into(),
            human: "a".into(),
            model: "b".into(),
        };
        let line = render_event(&done, false).unwrap();
        assert!(line.contains("human: a"));
        assert!(line.ends_with("model: b"));

        let progress = RunEvent::Progress {
            current: 2,
            total: 7,
        };
        assert_eq!(
            render_event(&progress, false),
            Some("[2/7] coding...".to_string())
        );
    }

    #[test]
    fn dataset_and_config_errors_are_user_errors() {
        let missing = anyhow::Error::new(DatasetError::MissingSheet {
            sheet: "code".into(),
        });
        assert!(is_user_error(&missing));

        let incomplete = anyhow::Error::new(ConfigError::Incomplete("key", "QCODER_API_KEY"));
        assert!(is_user_error(&incomplete));

        let internal = anyhow::anyhow!("Coding run panicked");
        assert!(!is_user_error(&internal));
    }

    #[test]
    fn settings_description_masks_the_key() {
        let settings = Settings {
            api_key: "sk-abcdefgh1234".into(),
            ..Settings::default()
        };
        let lines = describe_settings(&settings, Path::new("/tmp/settings.json"));
        let key_line = lines.iter().find(|l| l.starts_with("API key")).unwrap();
        assert!(key_line.ends_with("1234"));
        assert!(!key_line.contains("abcdefgh"));
        assert!(lines[1].ends_with("(not set)"));
    }

    #[test]
    fn unreadable_template_is_an_error() {
        let err = read_template(Path::new("/nonexistent/template.txt")).unwrap_err();
        assert!(err.to_string().contains("Failed to read prompt template"));
        assert!(is_user_error(&err));
    }

    #[test]
    fn template_without_placeholder_is_still_returned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.txt");
        fs::write(&path, "Code this").unwrap();
        assert_eq!(read_template(&path).unwrap(), "Code this");
    }

    #[test]
    fn cli_parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "qcoder", "-vv", "run", "data.xlsx", "--mode", "encode", "--output", "out",
            "--timeout", "5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run(cmd) => {
                assert_eq!(cmd.mode, Mode::Encode);
                assert_eq!(cmd.output, PathBuf::from("out"));
                assert_eq!(cmd.overrides.timeout, Some(5.0));
                assert!(cmd.template.is_none());
            }
            _ => panic!("expected run command"),
        }
    }
}
