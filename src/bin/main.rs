use std::process::ExitCode;

use serde_json::json;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use unicornctl::{
    ActionOutcome, Unicorn, UnicornError,
    cli::{Cli, Commands, parse_args},
    config::load_config,
};

fn main() -> ExitCode {
    let args = parse_args();
    init_logging(&args);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("unicornctl: {err}");
            let code = u8::try_from(err.kind().exit_code()).unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Command output owns stdout.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(args: &Cli) -> Result<(), UnicornError> {
    let mut config = load_config(args.file.as_deref())?;
    config.apply(&args.overrides());
    let unicorn = Unicorn::new(config)?;
    debug!(
        "Controlling unicorn {:?} via {:?}",
        unicorn.config().exec_path,
        unicorn.config().pid_file
    );

    match &args.command {
        Commands::Status { json: true } => {
            let status = unicorn.status()?;
            println!("{}", serde_json::to_string(&status)?);
        }
        Commands::Rogues { json } => {
            let found = unicorn.rogues();
            let tracked = found.as_ref().map(|(pid, _)| *pid);
            let rogues = found.map(|(_, rogues)| rogues).unwrap_or_default();
            if *json {
                println!(
                    "{}",
                    serde_json::to_string(&json!({ "tracked": tracked, "rogues": rogues }))?
                );
            } else if rogues.is_empty() {
                println!("* no rogue unicorn masters");
            } else {
                for pid in rogues {
                    println!("* rogue unicorn master {pid}");
                }
            }
        }
        command => {
            let action = command.action().ok_or_else(|| {
                UnicornError::Unicorn(format!("{command:?} is not an action"))
            })?;
            report(unicorn.run(action)?);
        }
    }

    Ok(())
}

fn report(outcome: ActionOutcome) {
    match outcome {
        ActionOutcome::Started => println!("* unicorn started"),
        ActionOutcome::Signalled { pid, signal } => {
            println!("* sent {} to unicorn {pid}", signal.as_str())
        }
        ActionOutcome::Restarted(report) => println!(
            "* unicorn restarted: {} -> {} ({:.1}s)",
            report.original,
            report.replacement,
            report.elapsed.as_secs_f64()
        ),
        ActionOutcome::Status(status) => println!(
            "* unicorn is running (pid {}, {} workers)",
            status.pid, status.workers
        ),
    }
}
