use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use gotidy_core::{
    outcome_from_run, CancelToken, CommandStatus, Config, ExecutionOutcome, GlobalOptions,
    RequestError, RunCoordinator, RunRequest,
};
use serde_json::{json, Value};

mod cli;

use cli::GotidyCli;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = GotidyCli::parse();
    init_tracing(cli.trace, cli.quiet, cli.verbose);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
    };

    let request = build_request(&cli);
    let outcome = execute(&request)?;
    let code = emit_output(&global, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, quiet: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("gotidy={level},gotidy_core={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn build_request(cli: &GotidyCli) -> RunRequest {
    let mut request = RunRequest::new(&cli.dir);
    request.tidy = cli.tidy;
    request.imports = cli.imports || cli.imports_prefix.is_some();
    request.local_prefix.clone_from(&cli.imports_prefix);
    request.pregroup = cli.imports_pregroup;
    request.write = cli.write;
    request
}

fn execute(request: &RunRequest) -> Result<ExecutionOutcome> {
    if let Err(err) = request.validate() {
        return Ok(ExecutionOutcome::from(&err));
    }
    let config = Config::from_env().map_err(|err| eyre!("{err:#}"))?;
    let coordinator = RunCoordinator::new(config);

    match coordinator.run_blocking(request, &CancelToken::new()) {
        Ok(run) => Ok(outcome_from_run(request, &run)),
        Err(err) => match err.downcast_ref::<RequestError>() {
            Some(request_err) => Ok(ExecutionOutcome::from(request_err)),
            None => Err(eyre!("{err:#}")),
        },
    }
}

fn emit_output(global: &GlobalOptions, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.exit_code();

    if global.json {
        let payload = json!({
            "status": outcome.status,
            "message": outcome.message,
            "details": outcome.details,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    match outcome.status {
        CommandStatus::Ok => {
            if !global.quiet {
                println!("gotidy: {}", outcome.message);
                for path in changed_paths(&outcome.details) {
                    println!("  {path}");
                }
            }
        }
        CommandStatus::UserError | CommandStatus::Failure => {
            eprintln!("gotidy: {}", outcome.message);
            for path in detected_paths(&outcome.details) {
                eprintln!("  {path}");
            }
            if let Some(hint) = hint_from_details(&outcome.details) {
                eprintln!("Hint: {hint}");
            }
        }
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn changed_paths(details: &Value) -> Vec<&str> {
    details
        .get("stages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|stage| stage.get("files").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .collect()
}

fn detected_paths(details: &Value) -> Vec<&str> {
    details
        .get("changes")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|change| change.get("key").and_then(Value::as_str))
        .collect()
}
