use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::cli::{Command, TaskFields};
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::{parse_compact_date, today};
use crate::http;
use crate::render::Renderer;
use crate::service::TaskService;
use crate::task::Task;

#[instrument(skip_all)]
pub fn dispatch(
    store: Arc<DataStore>,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let now = today();
    let service = TaskService::new(store);

    debug!(?command, %now, "dispatching command");

    match command {
        Command::NextDate { date, repeat, now: reference } => {
            cmd_next_date(&service, reference.as_deref(), &date, &repeat, now)
        }
        Command::Add { title, fields } => cmd_add(&service, title, fields, now),
        Command::List { limit } => cmd_list(&service, cfg, renderer, limit, now),
        Command::Info { id } => cmd_info(&service, renderer, &id),
        Command::Modify { id, title, fields } => cmd_modify(&service, &id, title, fields, now),
        Command::Done { id } => cmd_done(&service, &id, now),
        Command::Delete { id } => cmd_delete(&service, &id),
        Command::Serve { port } => cmd_serve(service, cfg, port),
        Command::Show => cmd_show(cfg),
    }
}

fn cmd_next_date(
    service: &TaskService,
    reference: Option<&str>,
    date: &str,
    repeat: &str,
    fallback: NaiveDate,
) -> anyhow::Result<()> {
    info!("command nextdate");

    let now = match reference {
        Some(raw) => parse_compact_date(raw).context("invalid --now")?,
        None => fallback,
    };
    let next = service.next_date(now, date, repeat)?;
    println!("{next}");
    Ok(())
}

fn cmd_add(service: &TaskService, title: String, fields: TaskFields, now: NaiveDate) -> anyhow::Result<()> {
    info!("command add");

    let task = Task {
        id: String::new(),
        date: fields.date.unwrap_or_default(),
        title,
        comment: fields.comment.unwrap_or_default(),
        repeat: fields.repeat.unwrap_or_default(),
    };
    let id = service.add_task(task, now)?;
    println!("Created task {id}.");
    Ok(())
}

fn cmd_list(
    service: &TaskService,
    cfg: &Config,
    renderer: &mut Renderer,
    limit: Option<usize>,
    now: NaiveDate,
) -> anyhow::Result<()> {
    info!("command list");

    let limit = match limit {
        Some(limit) => limit,
        None => cfg.list_limit()?,
    };
    let tasks = service.list_tasks(limit)?;
    renderer.print_task_table(&tasks, now)?;
    Ok(())
}

fn cmd_info(service: &TaskService, renderer: &mut Renderer, id: &str) -> anyhow::Result<()> {
    info!("command info");

    let task = service.get_task(id)?;
    renderer.print_task_info(&task)?;
    Ok(())
}

fn cmd_modify(
    service: &TaskService,
    id: &str,
    title: Option<String>,
    fields: TaskFields,
    now: NaiveDate,
) -> anyhow::Result<()> {
    info!("command modify");

    let mut task = service.get_task(id)?;
    if let Some(title) = title {
        task.title = title;
    }
    if let Some(date) = fields.date {
        task.date = date;
    }
    if let Some(comment) = fields.comment {
        task.comment = comment;
    }
    if let Some(repeat) = fields.repeat {
        task.repeat = repeat;
    }

    service.update_task(task, now)?;
    println!("Modified task {id}.");
    Ok(())
}

fn cmd_done(service: &TaskService, id: &str, now: NaiveDate) -> anyhow::Result<()> {
    info!("command done");

    service.complete_task(id, now)?;
    println!("Completed task {id}.");
    Ok(())
}

fn cmd_delete(service: &TaskService, id: &str) -> anyhow::Result<()> {
    info!("command delete");

    service.delete_task(id)?;
    println!("Deleted task {id}.");
    Ok(())
}

fn cmd_serve(service: TaskService, cfg: &Config, port: Option<u16>) -> anyhow::Result<()> {
    info!("command serve");

    let port = match port {
        Some(port) => port,
        None => cfg.port()?,
    };
    let list_limit = cfg.list_limit()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(http::serve(service, port, list_limit))
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key}={value}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}
