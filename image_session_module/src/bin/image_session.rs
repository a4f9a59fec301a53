//! Command-line entry point used by the chat agent.
//!
//! Messages for the user go to stdout (`MEDIA:` lines included); logs go to stderr.

use image_session_module::inbound::latest_inbound_image;
use image_session_module::workspace::{list_workspaces, read_chat_key, timer_scope, write_chat_key};
use image_session_module::{
    BoxError, Delivery, EditRequest, SessionConfig, SessionError, SessionManager,
    SqliteTimerService, TimerDriver, TimerRole,
};
use std::env;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type Manager = SessionManager<SqliteTimerService, Box<dyn Delivery>>;

fn print_usage() {
    eprintln!(
        r##"Usage: image-session <command> [arguments]

Commands:
  start     --chat ID [--source PATH|latest] [--restart]
  reference --chat ID [--source PATH|latest]
  edit      --chat ID --prompt TEXT [--reference PATH|latest]
  complete  --chat ID [--satisfied|--unsatisfied]
  status    --chat ID
  recover   [--chat ID]          Recover one workspace, or all when omitted
  fire      --chat ID --role reminder2h|reminder6h|cleanup24h
  serve                          Recover all workspaces, then run timers until Ctrl-C

--workspace DIR may be used instead of --chat.
--source defaults to the newest image in the inbound media directory.

Exit codes: 0 ok, 1 error, 2 a session is already active (answer with --restart)."##
    );
}

/// Value of `--flag=value` or `--flag value`. A flag followed by nothing, or
/// by another flag, is an error; use `--flag=--text` for values starting with `--`.
fn parse_arg(args: &[String], flag: &str) -> Result<Option<String>, BoxError> {
    let prefix = format!("{}=", flag);
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            return Ok(Some(value.to_string()));
        }
        if arg == flag {
            return match args.get(idx + 1) {
                Some(value) if !value.starts_with("--") => Ok(Some(value.clone())),
                _ => Err(format!("{} requires a value", flag).into()),
            };
        }
    }
    Ok(None)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

struct Target {
    workspace: PathBuf,
    chat: Option<String>,
}

fn resolve_target(config: &SessionConfig, args: &[String]) -> Result<Option<Target>, BoxError> {
    if let Some(chat) = parse_arg(args, "--chat")?.filter(|value| !value.trim().is_empty()) {
        let workspace = config.workspace_for_chat(&chat);
        write_chat_key(&workspace, &chat)?;
        return Ok(Some(Target {
            workspace,
            chat: Some(chat),
        }));
    }
    if let Some(dir) = parse_arg(args, "--workspace")? {
        let workspace = std::path::absolute(PathBuf::from(dir))?;
        let chat = read_chat_key(&workspace);
        return Ok(Some(Target { workspace, chat }));
    }
    Ok(None)
}

fn require_target(config: &SessionConfig, args: &[String]) -> Result<Target, BoxError> {
    resolve_target(config, args)?.ok_or_else(|| "--chat or --workspace is required".into())
}

fn resolve_image(config: &SessionConfig, raw: Option<String>) -> Result<PathBuf, BoxError> {
    match raw.as_deref() {
        None | Some("latest") => latest_inbound_image(&config.inbound_dir)?.ok_or_else(|| {
            format!(
                "no inbound image found in {}",
                config.inbound_dir.display()
            )
            .into()
        }),
        Some(path) => Ok(PathBuf::from(path)),
    }
}

fn build_manager(
    config: &SessionConfig,
    timers: &SqliteTimerService,
    workspace: &Path,
    chat: Option<&str>,
) -> Result<Manager, BoxError> {
    let delivery = config.delivery_for_chat(chat)?;
    Ok(SessionManager::new(
        workspace.to_path_buf(),
        timers.scoped(timer_scope(workspace)),
        delivery,
    )
    .with_timings(config.timings()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn recover_all(config: &SessionConfig, timers: &SqliteTimerService) -> Result<(), BoxError> {
    for workspace in list_workspaces(&config.workspace_root)? {
        let chat = read_chat_key(&workspace);
        let manager = match build_manager(config, timers, &workspace, chat.as_deref()) {
            Ok(manager) => manager,
            Err(err) => {
                error!("skipping recovery of {}: {}", workspace.display(), err);
                continue;
            }
        };
        match manager.recover() {
            Ok(report) => info!("recovered {}: {:?}", workspace.display(), report),
            Err(err) => error!("recovery of {} failed: {}", workspace.display(), err),
        }
    }
    Ok(())
}

fn serve(config: SessionConfig, timers: SqliteTimerService) -> Result<(), BoxError> {
    recover_all(&config, &timers)?;
    let config = Arc::new(config);
    let dispatch_config = config.clone();
    let dispatch_timers = timers.clone();
    let mut driver = TimerDriver::start(timers, config.poll_interval, move |due| {
        let workspace = PathBuf::from(&due.scope);
        let chat = read_chat_key(&workspace);
        let manager =
            match build_manager(&dispatch_config, &dispatch_timers, &workspace, chat.as_deref()) {
                Ok(manager) => manager,
                Err(err) => {
                    error!("cannot handle {} timer for {}: {}", due.role, due.scope, err);
                    return;
                }
            };
        match manager.on_timer_fired(&due) {
            Ok(outcome) => info!("{} timer for {}: {:?}", due.role, due.scope, outcome),
            Err(err) => error!("{} timer for {} failed: {}", due.role, due.scope, err),
        }
    });
    info!(
        "image session service watching {}",
        config.workspace_root.display()
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(tokio::signal::ctrl_c())?;
    info!("shutting down");
    driver.stop_and_join();
    Ok(())
}

fn run(command: &str, args: &[String]) -> Result<(), BoxError> {
    let config = SessionConfig::from_env()?;
    let timers = SqliteTimerService::new(&config.timer_db_path, "")?;

    match command {
        "start" => {
            let target = require_target(&config, args)?;
            let source = resolve_image(&config, parse_arg(args, "--source")?)?;
            let manager = build_manager(&config, &timers, &target.workspace, target.chat.as_deref())?;
            let session = if has_flag(args, "--restart") {
                manager.restart_session(&source)?
            } else {
                manager.start_session(&source)?
            };
            print_json(&session)
        }
        "reference" => {
            let target = require_target(&config, args)?;
            let source = resolve_image(&config, parse_arg(args, "--source")?)?;
            let manager = build_manager(&config, &timers, &target.workspace, target.chat.as_deref())?;
            print_json(&manager.add_reference(&source)?)
        }
        "edit" => {
            let target = require_target(&config, args)?;
            let prompt = parse_arg(args, "--prompt")?
                .filter(|value| !value.trim().is_empty())
                .ok_or("--prompt is required")?;
            let reference = match parse_arg(args, "--reference")? {
                Some(raw) => Some(resolve_image(&config, Some(raw))?),
                None => None,
            };
            let manager = build_manager(&config, &timers, &target.workspace, target.chat.as_deref())?;
            let generator = config.generator();
            manager.submit(&EditRequest { reference, prompt }, &generator)?;
            Ok(())
        }
        "complete" => {
            let target = require_target(&config, args)?;
            let satisfied = !has_flag(args, "--unsatisfied");
            let manager = build_manager(&config, &timers, &target.workspace, target.chat.as_deref())?;
            if manager.complete(satisfied)?.is_none() {
                eprintln!("No active image session.");
            }
            Ok(())
        }
        "status" => {
            let target = require_target(&config, args)?;
            let manager = build_manager(&config, &timers, &target.workspace, target.chat.as_deref())?;
            print_json(&manager.status()?)
        }
        "recover" => match resolve_target(&config, args)? {
            Some(target) => {
                let manager =
                    build_manager(&config, &timers, &target.workspace, target.chat.as_deref())?;
                print_json(&manager.recover()?)
            }
            None => recover_all(&config, &timers),
        },
        "fire" => {
            let target = require_target(&config, args)?;
            let role = parse_arg(args, "--role")?
                .ok_or("--role is required")?
                .parse::<TimerRole>()?;
            let manager = build_manager(&config, &timers, &target.workspace, target.chat.as_deref())?;
            print_json(&manager.on_reminder(role)?)
        }
        "serve" => serve(config, timers),
        other => Err(format!("unknown command: {}", other).into()),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1) else {
        print_usage();
        exit(1);
    };
    if command == "-h" || command == "--help" {
        print_usage();
        return;
    }

    if let Err(err) = run(command, &args[2..]) {
        eprintln!("Error: {}", err);
        let code = match err.downcast_ref::<SessionError>() {
            Some(SessionError::SessionConflict { .. }) => 2,
            _ => 1,
        };
        exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::parse_arg;

    fn argv(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parse_arg_accepts_both_forms() {
        let args = argv(&["--chat", "42", "--prompt=make it blue"]);
        assert_eq!(parse_arg(&args, "--chat").expect("chat"), Some("42".to_string()));
        assert_eq!(
            parse_arg(&args, "--prompt").expect("prompt"),
            Some("make it blue".to_string())
        );
        assert_eq!(parse_arg(&args, "--source").expect("source"), None);
    }

    #[test]
    fn parse_arg_rejects_a_flag_as_value() {
        let args = argv(&["--chat", "42", "--source", "--restart"]);
        let err = parse_arg(&args, "--source").expect_err("missing value");
        assert_eq!(err.to_string(), "--source requires a value");
    }

    #[test]
    fn parse_arg_rejects_a_trailing_flag() {
        let args = argv(&["--chat"]);
        assert!(parse_arg(&args, "--chat").is_err());
        let args = argv(&["--prompt=--bold"]);
        assert_eq!(
            parse_arg(&args, "--prompt").expect("prompt"),
            Some("--bold".to_string())
        );
    }
}
