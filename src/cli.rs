use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tokio::sync::mpsc;

use crate::app::{Action, App};
use crate::config::AppConfig;
use crate::model::bug::{NewBug, Severity};
use crate::model::task::{NewTask, Priority};
use crate::providers::ProjectService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Token,
    Projects,
    Tasks {
        project: Option<String>,
        search: Option<String>,
        email: Option<String>,
    },
    Statuses {
        project: Option<String>,
    },
    Add {
        project: Option<String>,
        task: NewTask,
    },
    Bug {
        project: Option<String>,
        bug: NewBug,
    },
    Status {
        project: Option<String>,
        task_id: String,
        status: String,
    },
    Help,
}

/// Flags shared by every subcommand, plus the words left over.
#[derive(Default)]
struct Parsed {
    words: Vec<String>,
    project: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    severity: Option<String>,
    search: Option<String>,
    email: Option<String>,
}

fn parse_flags(args: &[String], allowed: &[&str]) -> Result<Parsed> {
    let mut parsed = Parsed::default();
    let mut i = 0;

    while i < args.len() {
        let flag = args[i].as_str();
        let slot = match flag {
            "--project" => Some(&mut parsed.project),
            "-d" | "--desc" | "--description" => Some(&mut parsed.description),
            "-p" | "--priority" => Some(&mut parsed.priority),
            "-s" | "--severity" => Some(&mut parsed.severity),
            "--search" => Some(&mut parsed.search),
            "--email" => Some(&mut parsed.email),
            _ => None,
        };
        match slot {
            Some(slot) => {
                if !allowed.contains(&flag) {
                    bail!("Unexpected flag {flag}");
                }
                i += 1;
                match args.get(i) {
                    Some(value) => *slot = Some(value.clone()),
                    None => bail!("Missing value for {flag} flag"),
                }
            }
            None => parsed.words.push(args[i].clone()),
        }
        i += 1;
    }

    Ok(parsed)
}

/// Parse `zpanel` arguments (without the program name).
///
/// Supported forms:
///   zpanel tasks --project 1234 --search login --email dana@example.com
///   zpanel add "Fix login" -d "SSO users bounce" -p high
///   zpanel bug "Crash on save" -s critical
///   zpanel status 98765 "In Progress"
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "token" => Ok(Command::Token),
        "projects" => Ok(Command::Projects),
        "tasks" => {
            let parsed = parse_flags(rest, &["--project", "--search", "--email"])?;
            Ok(Command::Tasks {
                project: parsed.project,
                search: parsed.search,
                email: parsed.email,
            })
        }
        "statuses" => {
            let parsed = parse_flags(rest, &["--project"])?;
            Ok(Command::Statuses {
                project: parsed.project,
            })
        }
        "add" => {
            let parsed = parse_flags(
                rest,
                &["--project", "-d", "--desc", "--description", "-p", "--priority"],
            )?;
            let name = parsed.words.join(" ");
            if name.trim().is_empty() {
                bail!("Usage: zpanel add <name> [-d <description>] [-p <priority>]\n\nExamples:\n  zpanel add \"Fix the login bug\"\n  zpanel add \"Fix login\" -d \"Users can't log in with SSO\" -p high");
            }
            let priority = match parsed.priority {
                Some(p) => p.parse::<Priority>().map_err(|e| anyhow!(e))?,
                None => Priority::default(),
            };
            Ok(Command::Add {
                project: parsed.project,
                task: NewTask {
                    name,
                    description: parsed.description.unwrap_or_default(),
                    priority,
                },
            })
        }
        "bug" => {
            let parsed = parse_flags(
                rest,
                &["--project", "-d", "--desc", "--description", "-s", "--severity"],
            )?;
            let title = parsed.words.join(" ");
            if title.trim().is_empty() {
                bail!("Usage: zpanel bug <title> [-d <description>] [-s <severity>]");
            }
            let severity = match parsed.severity {
                Some(s) => s.parse::<Severity>().map_err(|e| anyhow!(e))?,
                None => Severity::default(),
            };
            Ok(Command::Bug {
                project: parsed.project,
                bug: NewBug {
                    title,
                    description: parsed.description.unwrap_or_default(),
                    severity,
                },
            })
        }
        "status" => {
            let parsed = parse_flags(rest, &["--project"])?;
            let mut words = parsed.words.into_iter();
            let (Some(task_id), Some(first)) = (words.next(), words.next()) else {
                bail!("Usage: zpanel status <task-id> <status>\n\nExample:\n  zpanel status 98765 \"In Progress\"");
            };
            let status = std::iter::once(first).chain(words).collect::<Vec<_>>().join(" ");
            Ok(Command::Status {
                project: parsed.project,
                task_id,
                status,
            })
        }
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => bail!("Unknown command '{other}'. Run `zpanel help` for usage."),
    }
}

/// Wait until the in-flight task fetch, if any, has been applied.
async fn settle(app: &mut App, rx: &mut mpsc::UnboundedReceiver<Action>) {
    while app.loading {
        match rx.recv().await {
            Some(action) => app.update(action),
            None => break,
        }
    }
}

pub async fn run(command: Command, config: &AppConfig, service: Arc<dyn ProjectService>) -> Result<()> {
    if command == Command::Help {
        print_help();
        return Ok(());
    }
    if command == Command::Token {
        let token = service.get_token().await?;
        println!("Access token: {}", token.masked());
        return Ok(());
    }

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let mut app = App::new(service, action_tx, config.debug);

    let project = match &command {
        Command::Tasks { project, .. }
        | Command::Statuses { project }
        | Command::Add { project, .. }
        | Command::Bug { project, .. }
        | Command::Status { project, .. } => project.clone(),
        _ => None,
    }
    .or_else(|| config.zoho.default_project.clone());

    app.init(project.as_deref()).await?;
    if let (Some(wanted), Some(selected)) = (project.as_deref(), app.selected_project.as_deref()) {
        let found = app.selected_project().is_some_and(|p| p.id == wanted || p.name.eq_ignore_ascii_case(wanted));
        if !found {
            eprintln!("Project '{wanted}' not found, using {selected}");
        }
    }

    match command {
        Command::Projects => {
            if app.projects.is_empty() {
                println!("No projects found.");
            }
            for project in &app.projects {
                println!("{}  {}", project.id, project.name);
            }
        }
        Command::Tasks { search, email, .. } => {
            settle(&mut app, &mut action_rx).await;
            app.set_search(search.as_deref().unwrap_or_default());
            app.set_requester_email(email.as_deref().unwrap_or_default());
            if let Some((message, _)) = &app.flash_message {
                bail!("{message}");
            }
            let visible = app.visible_tasks();
            if visible.is_empty() {
                println!("No tasks.");
            }
            for task in visible {
                println!(
                    "{}  [{}]  {:<6}  {}",
                    task.id,
                    task.status.name,
                    task.priority.display_name(),
                    task.name
                );
            }
        }
        Command::Statuses { .. } => {
            settle(&mut app, &mut action_rx).await;
            for status in &app.statuses {
                println!("{}  {}  ({})", status.id, status.name, status.category);
            }
        }
        Command::Add { task, .. } => {
            let created = app.create_task(task).await?;
            if created.id.is_empty() {
                println!("Created task: {} (id not returned yet)", created.name);
            } else {
                println!("Created task {}: {}", created.id, created.name);
            }
        }
        Command::Bug { bug, .. } => {
            let ack = app.create_bug(bug).await?;
            match ack.id {
                Some(id) => println!("{} ({id})", ack.message),
                None => println!("{}", ack.message),
            }
        }
        Command::Status {
            task_id, status, ..
        } => {
            let ack = app.update_task_status(&task_id, &status).await?;
            println!("{}", ack.message);
        }
        Command::Token | Command::Help => {}
    }

    Ok(())
}

pub fn print_help() {
    println!("zpanel: manage Zoho Projects tasks from the terminal\n");
    println!("USAGE:");
    println!("  zpanel token                     Show the current access token (masked)");
    println!("  zpanel projects                  List projects in the portal");
    println!("  zpanel tasks                     List tasks of the selected project");
    println!("  zpanel statuses                  List the project's task statuses");
    println!("  zpanel add <name>                Create a task");
    println!("  zpanel bug <title>               Report a bug");
    println!("  zpanel status <task-id> <status> Move a task to another status");
    println!();
    println!("OPTIONS:");
    println!("  --project <id|name>  Project to work in (default: config or first project)");
    println!("  --search <text>      tasks: only names containing <text>");
    println!("  --email <text>       tasks: only tasks owned or created by <text>");
    println!("  -d, --desc <text>    add/bug: description");
    println!("  -p, --priority <p>   add: none, low, medium or high");
    println!("  -s, --severity <s>   bug: minor, medium, major or critical");
    println!();
    println!("EXAMPLES:");
    println!("  zpanel add \"Fix the login bug\" -p high");
    println!("  zpanel status 98765 \"In Progress\"");
}
