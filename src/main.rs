use clap::{Args, Parser, Subcommand};
use focusflow_core::application::commands::{
    complete_task_impl, create_task_impl, delete_task_impl, get_settings_impl, list_tasks_impl,
    start_focus_timer_impl, toggle_task_impl, update_settings_impl, AppState,
};
use focusflow_core::application::focus_timer::FocusTimer;
use focusflow_core::domain::models::{Task, TimerMode, UserSettings};
use focusflow_core::infrastructure::error::InfraError;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "focusflow", about = "Focus timer and task sync for a FocusFlow server", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Workspace holding config/, state/ and logs/ (defaults to the current directory)
    #[arg(short = 'C', long = "workspace", global = true)]
    workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Task list operations
    #[command(subcommand)]
    Tasks(TasksCmd),
    /// Timer settings
    #[command(subcommand)]
    Settings(SettingsCmd),
    /// Run the focus timer in the terminal
    #[command(subcommand)]
    Timer(TimerCmd),
}

#[derive(Subcommand)]
enum TasksCmd {
    /// List tasks, falling back to the local cache when offline
    List {
        /// Skip the server and print the cached list
        #[arg(long)]
        offline: bool,
    },
    /// Create a task
    Add(AddArgs),
    /// Mark a task completed
    Done { id: i64 },
    /// Flip a task between done and not done
    Toggle { id: i64 },
    /// Delete a task
    Rm { id: i64 },
}

#[derive(Args)]
struct AddArgs {
    title: String,
    #[arg(short, long)]
    description: Option<String>,
    #[arg(short, long)]
    priority: Option<i32>,
    /// Estimated minutes
    #[arg(short, long)]
    estimate: Option<u32>,
    /// Tag (repeatable)
    #[arg(short, long = "tag")]
    tags: Vec<String>,
}

#[derive(Subcommand)]
enum SettingsCmd {
    /// Show effective timer settings
    Show,
    /// Change timer settings on the server and locally
    Set(SetArgs),
}

#[derive(Args)]
struct SetArgs {
    #[arg(long)]
    focus: Option<u32>,
    #[arg(long)]
    short_break: Option<u32>,
    #[arg(long)]
    long_break: Option<u32>,
    #[arg(long)]
    cycles: Option<u32>,
    #[arg(long)]
    timer_mode: Option<String>,
}

#[derive(Subcommand)]
enum TimerCmd {
    /// Count down and record sessions until the requested focus phases finish
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// focus, short_break or long_break
    #[arg(long, default_value = "focus")]
    mode: String,
    /// Task the focus sessions belong to
    #[arg(long)]
    task: Option<i64>,
    /// Number of focus phases to complete before exiting
    #[arg(long, default_value_t = 1)]
    cycles: u32,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let workspace = match cli.workspace.clone() {
        Some(path) => path,
        None => match std::env::current_dir() {
            Ok(path) => path,
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        },
    };
    let state = match AppState::new(workspace) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let (name, result) = dispatch(&state, cli.command, cli.json).await;
    if let Err(e) = result {
        eprintln!("error: {}", state.command_error(name, &e));
        std::process::exit(1);
    }
}

async fn dispatch(
    state: &AppState,
    command: Commands,
    json: bool,
) -> (&'static str, Result<(), InfraError>) {
    match command {
        Commands::Tasks(TasksCmd::List { offline }) => {
            let response = list_tasks_impl(state, !offline).await;
            if let Some(error) = response.error.as_deref() {
                eprintln!("warning: showing cached tasks ({error})");
            }
            ("list_tasks", print_tasks(&response.tasks, json))
        }
        Commands::Tasks(TasksCmd::Add(args)) => {
            let result = create_task_impl(
                state,
                args.title,
                args.description,
                args.priority,
                args.estimate,
                args.tags,
            )
            .await;
            ("create_task", result.and_then(|task| print_task(&task, json)))
        }
        Commands::Tasks(TasksCmd::Done { id }) => {
            let result = complete_task_impl(state, id).await;
            ("complete_task", result.and_then(|task| print_task(&task, json)))
        }
        Commands::Tasks(TasksCmd::Toggle { id }) => {
            let result = toggle_task_impl(state, id).await;
            ("toggle_task", result.and_then(|task| print_task(&task, json)))
        }
        Commands::Tasks(TasksCmd::Rm { id }) => {
            let result = delete_task_impl(state, id).await.map(|removed| {
                if !json {
                    println!("deleted {id}{}", if removed { "" } else { " (was not cached)" });
                }
            });
            ("delete_task", result)
        }
        Commands::Settings(SettingsCmd::Show) => {
            let result = get_settings_impl(state).await;
            ("get_settings", result.and_then(|response| print_value(&response, json)))
        }
        Commands::Settings(SettingsCmd::Set(args)) => {
            let patch = UserSettings {
                focus_minutes: args.focus,
                short_break_minutes: args.short_break,
                long_break_minutes: args.long_break,
                cycles_before_long_break: args.cycles,
                timer_mode: args.timer_mode,
                ..UserSettings::default()
            };
            let result = update_settings_impl(state, patch).await;
            ("update_settings", result.and_then(|settings| print_value(&settings, json)))
        }
        Commands::Timer(TimerCmd::Run(args)) => ("run_timer", run_timer(state, args, json).await),
    }
}

async fn run_timer(state: &AppState, args: RunArgs, json: bool) -> Result<(), InfraError> {
    let mode = TimerMode::parse(&args.mode)
        .ok_or_else(|| InfraError::InvalidInput(format!("unknown timer mode: {}", args.mode)))?;
    let timer = start_focus_timer_impl(state)?;
    let result = drive_timer(&timer, mode, args, json).await;
    // Queued session requests still reach the server when the loop fails.
    timer.shutdown().await;
    result
}

async fn drive_timer(
    timer: &FocusTimer,
    mode: TimerMode,
    args: RunArgs,
    json: bool,
) -> Result<(), InfraError> {
    let mut remaining = args.cycles.max(1);
    if mode != TimerMode::Focus {
        timer.switch_mode(mode)?;
    }
    let mut updates = timer.subscribe();
    let mut previous = timer.snapshot();
    timer.start(args.task)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                } else {
                    print!("\r{:<12} {}", snapshot.mode.as_str(), snapshot.display);
                    let _ = std::io::stdout().flush();
                }

                let phase_ended = previous.running && !snapshot.running && previous.mode != snapshot.mode;
                if phase_ended {
                    if !json {
                        println!();
                    }
                    if previous.mode == TimerMode::Focus {
                        remaining = remaining.saturating_sub(1);
                    }
                    if remaining == 0 {
                        break;
                    }
                    timer.start(args.task)?;
                }
                previous = snapshot;
            }
            _ = &mut ctrl_c => {
                timer.reset()?;
                if !json {
                    println!();
                }
                break;
            }
        }
    }
    Ok(())
}

fn print_tasks(tasks: &[Task], json: bool) -> Result<(), InfraError> {
    if json {
        println!("{}", serde_json::to_string_pretty(tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("no tasks");
    }
    for task in tasks {
        print_task(task, false)?;
    }
    Ok(())
}

fn print_task(task: &Task, json: bool) -> Result<(), InfraError> {
    if json {
        println!("{}", serde_json::to_string_pretty(task)?);
        return Ok(());
    }
    let mark = if task.is_done() { "x" } else { " " };
    let tags = task.tag_list();
    if tags.is_empty() {
        println!("[{mark}] {:>4}  {}", task.id, task.title);
    } else {
        println!("[{mark}] {:>4}  {}  #{}", task.id, task.title, tags.join(" #"));
    }
    Ok(())
}

fn print_value<T: Serialize>(value: &T, json: bool) -> Result<(), InfraError> {
    if json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}
