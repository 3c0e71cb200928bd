use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::select;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::command::Command;
use crate::dashboard::Dashboard;
use crate::form::parse_switch;
use crate::poller::{PollerHandle, RefreshHandle};
use crate::state::ConfigField;
use crate::transport::Backend;
use crate::view::DashboardView;

const HELP: &str = "\
Commands:
  show                          print the dashboard
  refresh                       refresh status, history and mask now
  reload                        discard unsaved edits and reload config
  set <field> [value]           edit a config field (empty value clears optional fields)
  save                          write edited config
  alarm on|off                  enable or disable the alarm
  delay on|off                  enable or disable the delay monitor
  mask-mode inclusive|exclusive switch mask interpretation
  reset                         acknowledge the current alarm
  mask upload <path>            upload a detection mask image
  mask reset                    remove the detection mask
  export <path>                 write transferable settings as JSON
  import <path>                 apply settings from an exported JSON file
  health                        show backend health
  quit                          exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Show,
    Refresh,
    Reload,
    Set { field: ConfigField, value: String },
    Save,
    Control(Command),
    MaskUpload(PathBuf),
    MaskReset,
    Export(PathBuf),
    Import(PathBuf),
    Health,
    Help,
    Quit,
}

/// Parse one input line. `Ok(None)` for a blank line.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb {
        "" => return Ok(None),
        "show" => ConsoleCommand::Show,
        "refresh" => ConsoleCommand::Refresh,
        "reload" => ConsoleCommand::Reload,
        "save" => ConsoleCommand::Save,
        "reset" => ConsoleCommand::Control(Command::ResetAlarm),
        "health" => ConsoleCommand::Health,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        "set" => {
            let (name, value) = match rest.split_once(char::is_whitespace) {
                Some((name, value)) => (name, value.trim()),
                None => (rest, ""),
            };
            if name.is_empty() {
                return Err("Usage: set <field> [value]".to_string());
            }
            let field: ConfigField = name.parse().map_err(|e| format!("{}", e))?;
            ConsoleCommand::Set {
                field,
                value: value.to_string(),
            }
        }
        "alarm" => ConsoleCommand::Control(Command::SetAlarmEnabled(switch(rest, "alarm")?)),
        "delay" => ConsoleCommand::Control(Command::SetDelayMonitorEnabled(switch(rest, "delay")?)),
        "mask-mode" => match rest {
            "inclusive" => ConsoleCommand::Control(Command::SetMaskInclusive(true)),
            "exclusive" => ConsoleCommand::Control(Command::SetMaskInclusive(false)),
            _ => return Err("Usage: mask-mode inclusive|exclusive".to_string()),
        },
        "mask" => match rest.split_once(char::is_whitespace) {
            Some(("upload", path)) if !path.trim().is_empty() => {
                ConsoleCommand::MaskUpload(PathBuf::from(path.trim()))
            }
            None if rest == "reset" => ConsoleCommand::MaskReset,
            _ => return Err("Usage: mask upload <path> | mask reset".to_string()),
        },
        "export" => ConsoleCommand::Export(path_arg(rest, "export")?),
        "import" => ConsoleCommand::Import(path_arg(rest, "import")?),
        other => return Err(format!("Unknown command '{}'. Type 'help'.", other)),
    };
    Ok(Some(command))
}

fn switch(raw: &str, verb: &str) -> Result<bool, String> {
    parse_switch(raw).ok_or_else(|| format!("Usage: {} on|off", verb))
}

fn path_arg(raw: &str, verb: &str) -> Result<PathBuf, String> {
    if raw.is_empty() {
        return Err(format!("Usage: {} <path>", verb));
    }
    Ok(PathBuf::from(raw))
}

/// Read commands from stdin and reprint the dashboard whenever what it shows changes.
/// Returns on `quit` or end of input.
pub async fn run_console<B: Backend>(
    dashboard: Dashboard<B>,
    poller: &PollerHandle,
) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    run_lines(dashboard, poller.refresh_handle(), stdin).await
}

/// Drive the console from any line source.
///
/// Local commands (`show`, `help`, `set`) run in input order. Anything that talks to
/// the backend runs on its own task, so a slow request never stalls input or rendering.
/// Requests still outstanding at `quit` are cancelled.
pub async fn run_lines<B, R>(
    dashboard: Dashboard<B>,
    refresh: RefreshHandle,
    reader: R,
) -> anyhow::Result<()>
where
    B: Backend,
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut changes = dashboard.subscribe();
    let mut shown: Option<DashboardView> = None;
    let mut pending: JoinSet<()> = JoinSet::new();

    println!("{}", HELP);
    loop {
        select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = dashboard.view();
                if shown.as_ref() != Some(&view) {
                    println!("\n{}", view.render_text());
                    shown = Some(view);
                }
            }
            Some(done) = pending.join_next(), if !pending.is_empty() => {
                if let Err(e) = done {
                    warn!("Console command task failed: {}", e);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Console input closed");
                    break;
                };
                match parse_line(&line) {
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(e) = run_local(&dashboard, command, &refresh, &mut pending) {
                            println!("Error: {}", e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{}", e),
                }
            }
        }
    }
    if !pending.is_empty() {
        info!("Cancelling {} outstanding console command(s)", pending.len());
    }
    Ok(())
}

/// Run a local command in place, or hand a backend command to its own task.
fn run_local<B: Backend>(
    dashboard: &Dashboard<B>,
    command: ConsoleCommand,
    refresh: &RefreshHandle,
    pending: &mut JoinSet<()>,
) -> Result<(), String> {
    match command {
        ConsoleCommand::Show => println!("{}", dashboard.view().render_text()),
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Set { field, value } => {
            if !dashboard.edit_input(field, &value)? {
                println!("Ignoring invalid value for {}; it will not be saved", field);
            }
        }
        ConsoleCommand::Quit => {}
        command => {
            let dashboard = dashboard.clone();
            let refresh = refresh.clone();
            pending.spawn(async move {
                if let Err(e) = dispatch(&dashboard, &refresh, command).await {
                    println!("Error: {}", e);
                }
            });
        }
    }
    Ok(())
}

async fn dispatch<B: Backend>(
    dashboard: &Dashboard<B>,
    refresh: &RefreshHandle,
    command: ConsoleCommand,
) -> Result<(), String> {
    match command {
        ConsoleCommand::Refresh => refresh.refresh_now().await?,
        ConsoleCommand::Reload => dashboard.reload_config().await?,
        ConsoleCommand::Save => dashboard.save_config().await?,
        ConsoleCommand::Control(command) => dashboard.execute(command).await?,
        ConsoleCommand::MaskUpload(path) => dashboard.upload_mask_file(&path).await?,
        ConsoleCommand::MaskReset => dashboard.reset_mask().await?,
        ConsoleCommand::Export(path) => {
            dashboard.export_config_to(&path).await?;
            println!("Exported settings to {}", path.display());
        }
        ConsoleCommand::Import(path) => dashboard.import_config_from(&path).await?,
        ConsoleCommand::Health => match dashboard.health().await {
            Ok(report) => println!("{:#?}", report),
            Err(e) => {
                warn!("Health check failed: {}", e);
                return Err(e.into());
            }
        },
        ConsoleCommand::Show
        | ConsoleCommand::Help
        | ConsoleCommand::Set { .. }
        | ConsoleCommand::Quit => {}
    }
    Ok(())
}
