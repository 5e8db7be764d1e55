use facet::Facet;
use figue as args;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use crashmark::CRASH_EXIT_CODE;
use crashmark_sim::SimDump;

mod scenarios;

type AnyResult<T> = Result<T, String>;
pub(crate) const DEMO_CHILD_MODE_ENV: &str = "CRASHMARK_DEMO_CHILD_MODE";

const DEFAULT_FRAMES: u64 = 120;
const DEFAULT_DRAWS: u32 = 24;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Frames presented before the scenario ends.
    #[facet(args::named, default)]
    frames: Option<u64>,
    /// Draw markers emitted per frame.
    #[facet(args::named, default)]
    draws: Option<u32>,
    /// Where the simulated crash dump is written.
    #[facet(args::named, default)]
    dump_out: Option<String>,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum CommandKind {
    Healthy,
    DeviceRemoved,
    StalledDump,
    InlineMarkers,
}

impl CommandKind {
    fn cli_name(self) -> &'static str {
        match self {
            CommandKind::Healthy => "healthy",
            CommandKind::DeviceRemoved => "device-removed",
            CommandKind::StalledDump => "stalled-dump",
            CommandKind::InlineMarkers => "inline-markers",
        }
    }

    fn ends_in_crash(self) -> bool {
        !matches!(self, CommandKind::Healthy)
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> AnyResult<()> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = options_from_cli(&cli);
    if std::env::var_os(DEMO_CHILD_MODE_ENV).is_some() {
        return dispatch_command(cli.command, &options);
    }

    println!("Running scenario {} in a child process", cli.command.cli_name());
    let status = run_scenario_in_subprocess(&cli, &options)?;
    scenario_status_to_result(cli.command, &status)?;

    if cli.command.ends_in_crash() {
        if let Some(path) = &options.dump_out {
            print_dump(path)?;
        }
    }
    Ok(())
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("crashmark-demo")
                .description("Render against a simulated GPU crash tracker")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}

fn options_from_cli(cli: &Cli) -> scenarios::DemoOptions {
    let dump_out = cli
        .dump_out
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("CRASHMARK_DEMO_DUMP").map(PathBuf::from));

    scenarios::DemoOptions {
        frames: cli.frames.unwrap_or(DEFAULT_FRAMES).max(1),
        draws: cli.draws.unwrap_or(DEFAULT_DRAWS),
        dump_out,
    }
}

fn dispatch_command(command: CommandKind, options: &scenarios::DemoOptions) -> AnyResult<()> {
    match command {
        CommandKind::Healthy => scenarios::healthy::run(options),
        CommandKind::DeviceRemoved => scenarios::device_removed::run(options),
        CommandKind::StalledDump => scenarios::stalled_dump::run(options),
        CommandKind::InlineMarkers => scenarios::inline_markers::run(options),
    }
}

fn run_scenario_in_subprocess(
    cli: &Cli,
    options: &scenarios::DemoOptions,
) -> AnyResult<ExitStatus> {
    let exe = std::env::current_exe().map_err(|e| format!("failed to resolve current exe: {e}"))?;
    let mut cmd = Command::new(exe);
    cmd.env(DEMO_CHILD_MODE_ENV, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    cmd.args(["--frames", &options.frames.to_string()]);
    cmd.args(["--draws", &options.draws.to_string()]);
    if let Some(path) = &options.dump_out {
        cmd.arg("--dump-out").arg(path);
    }
    cmd.arg(cli.command.cli_name());

    let mut child = cmd
        .spawn()
        .map_err(|e| format!("failed to run scenario subprocess: {e}"))?;
    child
        .wait()
        .map_err(|e| format!("failed waiting for scenario subprocess: {e}"))
}

fn scenario_status_to_result(command: CommandKind, status: &ExitStatus) -> AnyResult<()> {
    if !command.ends_in_crash() {
        if status.success() {
            return Ok(());
        }
        return Err(format!(
            "scenario subprocess failed: {}",
            format_status(*status)
        ));
    }

    if is_crash_exit(status) {
        println!(
            "Scenario terminated after device loss: {}",
            format_status(*status)
        );
        return Ok(());
    }
    Err(format!(
        "scenario should have terminated with the crash exit code, got {}",
        format_status(*status)
    ))
}

/// Exit codes are truncated to a byte on unix.
fn is_crash_exit(status: &ExitStatus) -> bool {
    matches!(status.code(), Some(code) if code == CRASH_EXIT_CODE || code == CRASH_EXIT_CODE & 0xFF)
}

fn format_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "signal".to_owned(),
    }
}

fn print_dump(path: &std::path::Path) -> AnyResult<()> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("No crash dump at {}: {e}", path.display());
            return Ok(());
        }
    };
    let dump = SimDump::from_json(&bytes)
        .map_err(|e| format!("failed to parse crash dump {}: {e}", path.display()))?;

    println!(
        "Crash dump for {} {} ({} command lists):",
        dump.application_name,
        dump.application_version,
        dump.breadcrumbs.len()
    );
    for crumb in &dump.breadcrumbs {
        let text = crumb.text.as_deref().unwrap_or("<unresolved>");
        match crumb.token {
            Some(token) => println!("  {:<8} token {token:>6}  {text}", crumb.command_list),
            None => println!("  {:<8} inline        {text}", crumb.command_list),
        }
    }
    Ok(())
}
