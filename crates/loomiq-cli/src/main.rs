//! `loomiq`: submit tasks to the LoomIQ backend and follow them live.

mod args;
mod listing;
mod render;

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, bail};
use clap::Parser as _;
use loomiq_stream::prelude::*;
use loomiq_stream::{ChangePasswordRequest, TaskRecord, init_observability};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::args::{Cli, Command, RunArgs, TokenArgs};
use crate::render::TerminalRenderer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_observability(cli.log_level());

    let mut config = ClientConfig::from_env()?;
    if let Some(base) = cli.api_base.clone() {
        config = config.api_base(base);
    }
    config.validate()?;
    let api = TaskApi::new(config.clone())?;

    match cli.command {
        Command::Login { username, password } => {
            let session = api
                .login(&username, &password)
                .await
                .context("login failed")?;
            if let Some(user) = session.user() {
                eprintln!("Signed in as {}", user.display_name());
            }
            if let Some(expires_at) = session.expires_at() {
                eprintln!("Token expires at {expires_at}");
            }
            println!("{}", session.token());
            Ok(())
        }
        Command::Run(run) => {
            let session = AuthSession::new(run.auth.token.clone(), None)
                .context("invalid LOOMIQ_TOKEN")?;
            let task = submit(&api, &session, &run).await?;
            eprintln!("Submitted task {}", task.id);
            follow(&api, &config, &session, &task.id, cli.json).await
        }
        Command::Watch { task_id, auth } => {
            let session =
                AuthSession::new(auth.token, None).context("invalid LOOMIQ_TOKEN")?;
            follow(&api, &config, &session, &task_id, cli.json).await
        }
        Command::Tasks { poll, auth } => {
            let session = token_session(auth)?;
            match poll {
                None => print_tasks(&api, &session, cli.json).await,
                Some(secs) => poll_tasks(&api, &session, secs, cli.json).await,
            }
        }
        Command::Agents { auth } => {
            let session = token_session(auth)?;
            let agents = api.list_agents(&session).await.context("listing agents failed")?;
            let mut stdout = std::io::stdout().lock();
            if cli.json {
                writeln!(stdout, "{}", serde_json::to_string(&agents)?)?;
            } else if agents.is_empty() {
                writeln!(stdout, "No agents registered.")?;
            } else {
                writeln!(stdout, "{} active agents", agents.len())?;
                for agent in &agents {
                    writeln!(stdout, "\n{}", listing::format_agent(agent))?;
                }
            }
            Ok(())
        }
        Command::Stats { auth } => {
            let session = token_session(auth)?;
            let stats = api.stats(&session).await.context("fetching stats failed")?;
            if cli.json {
                println!("{}", serde_json::to_string(&stats)?);
            } else {
                println!("{}", listing::format_stats(&stats));
            }
            Ok(())
        }
        Command::Whoami { username, password } => {
            let session = api
                .login(&username, &password)
                .await
                .context("login failed")?;
            let Some(user) = session.user() else {
                bail!("the backend returned no profile for {username}");
            };
            if cli.json {
                println!("{}", serde_json::to_string(user)?);
            } else {
                println!("{}", listing::format_profile(user));
            }
            Ok(())
        }
        Command::Passwd {
            old,
            new,
            confirm,
            auth,
        } => {
            let session = token_session(auth)?;
            let request = ChangePasswordRequest {
                old_password: old,
                new_password: new,
                confirm_password: confirm,
            };
            api.change_password(&session, &request)
                .await
                .context("changing password failed")?;
            eprintln!("Password updated.");
            Ok(())
        }
    }
}

fn token_session(auth: TokenArgs) -> anyhow::Result<AuthSession> {
    AuthSession::new(auth.token, None).context("invalid LOOMIQ_TOKEN")
}

async fn print_tasks(api: &TaskApi, session: &AuthSession, json: bool) -> anyhow::Result<()> {
    let tasks = api.list_tasks(session).await.context("listing tasks failed")?;
    if json {
        println!("{}", serde_json::to_string(&tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No tasks yet.");
        return Ok(());
    }
    // agent names are cosmetic; rows fall back to the raw agent id
    let agents = match api.list_agents(session).await {
        Ok(agents) => agents,
        Err(err) => {
            warn!(error = %err, "listing agents failed");
            Vec::new()
        }
    };
    let mut stdout = std::io::stdout().lock();
    for task in &tasks {
        writeln!(stdout, "{}", listing::format_task_row(task, &agents))?;
    }
    Ok(())
}

/// Reprints the task list and counters every `secs` seconds until Ctrl-C.
async fn poll_tasks(
    api: &TaskApi,
    session: &AuthSession,
    secs: u64,
    json: bool,
) -> anyhow::Result<()> {
    if secs == 0 {
        bail!("--poll interval must be at least one second");
    }
    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => return Ok(()),
            _ = ticker.tick() => {
                // a failed refresh keeps the last listing on screen
                match api.stats(session).await {
                    Ok(stats) if !json => println!("\n{}", listing::format_stats(&stats)),
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "refreshing stats failed"),
                }
                if let Err(err) = print_tasks(api, session, json).await {
                    warn!(error = %err, "refreshing tasks failed");
                }
            }
        }
    }
}

async fn submit(api: &TaskApi, session: &AuthSession, run: &RunArgs) -> anyhow::Result<TaskRecord> {
    let task = NewTask::new(run.prompt.clone())
        .task_type(run.task_type.clone())
        .priority(run.priority.into())
        .use_collaboration(run.collaborate);
    api.submit_task(session, &task)
        .await
        .context("task submission failed")
}

/// Streams a task until it is terminal, then prints the final record.
async fn follow(
    api: &TaskApi,
    config: &ClientConfig,
    session: &AuthSession,
    task_id: &str,
    json: bool,
) -> anyhow::Result<()> {
    let source = HttpEventSource::new(config.clone())?;
    let monitor = TaskStreamMonitor::new(Arc::new(source), config.clone());
    let (done_tx, done_rx) = oneshot::channel();
    let mut handle = monitor.open_with(session, task_id, move || {
        let _ = done_tx.send(());
    })?;

    let mut renderer = TerminalRenderer::new(json);
    let mut stdout = std::io::stdout().lock();
    renderer.header(task_id, &mut stdout)?;
    renderer.render(&handle.snapshot(), &mut stdout)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let finished = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                handle.close();
                stdout.flush()?;
                bail!("interrupted; stream for task {task_id} closed");
            }
            changed = handle.changed() => {
                let Some(snapshot) = changed else {
                    break handle.snapshot();
                };
                renderer.render(&snapshot, &mut stdout)?;
                stdout.flush()?;
                if snapshot.is_finished() {
                    break snapshot;
                }
            }
        }
    };
    renderer.footer(&finished, &mut stdout)?;
    stdout.flush()?;

    // the callback fires after the grace delay, once the last line is visible
    let grace = config.completion_grace.max(config.failure_grace) + Duration::from_secs(1);
    if tokio::time::timeout(grace, done_rx).await.is_err() {
        warn!(task_id, "completion callback did not fire");
    }

    match api.get_task(session, task_id).await {
        Ok(record) => print_record(&record, json, &mut stdout)?,
        Err(err) => warn!(task_id, error = %err, "could not fetch final task record"),
    }

    info!(task_id, status = %finished.status, elapsed_secs = finished.elapsed_secs, "stream finished");
    match finished.status {
        StreamStatus::Done => Ok(()),
        status => bail!("task {task_id} ended with status {status}"),
    }
}

fn print_record(
    record: &TaskRecord,
    json: bool,
    out: &mut impl std::io::Write,
) -> anyhow::Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(record)?)?;
        return Ok(());
    }
    writeln!(
        out,
        "\n{} [{}]",
        record.title.as_deref().unwrap_or(&record.id),
        record.status.as_deref().unwrap_or("unknown")
    )?;
    match &record.result {
        Some(serde_json::Value::String(text)) => writeln!(out, "{text}")?,
        Some(value) => writeln!(out, "{}", serde_json::to_string_pretty(value)?)?,
        None => {}
    }
    Ok(())
}
