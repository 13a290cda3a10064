//! Command dispatch and terminal output.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info, warn};

use pitchdeck_api::ApiClient;
use pitchdeck_job_connection::{ConnectionEvent, JobSubscription};
use pitchdeck_protocol::{Analysis, AnalysisResult, Deck, JobId, JobStatus, KnowledgeFile};
use pitchdeck_store::{AppStore, JobProgress};

use crate::cli::{Cli, Command, KnowledgeCommand};
use crate::config::Config;

/// Runs one CLI command to completion.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let api = ApiClient::new()?.with_base_url(config.api_url.clone());
    let mut store = AppStore::new(api);
    let json = cli.json;

    match cli.command {
        Command::Analyze {
            file,
            startup_name,
            watch,
        } => {
            let analysis = store
                .upload_deck(&file, &startup_name)
                .await
                .with_context(|| format!("analyzing {}", file.display()))?;
            print_value(json, &analysis, render_analysis)?;
            if watch {
                watch_job(&mut store, &config, analysis.job_id(), json).await?;
            }
        }
        Command::Decks { id: Some(id) } => {
            store.fetch_deck(&id).await?;
            if let Some(deck) = &store.state().current_deck {
                print_value(json, deck, render_deck)?;
            }
        }
        Command::Decks { id: None } => {
            store.fetch_decks().await?;
            print_list(json, &store.state().decks, render_deck, "no decks")?;
        }
        Command::Status { job_id } => {
            store.fetch_analysis_status(&JobId::from(job_id)).await?;
            if let Some(analysis) = &store.state().analysis {
                print_value(json, analysis, render_analysis)?;
            }
        }
        Command::Result { job_id } => {
            store.fetch_analysis_result(&JobId::from(job_id)).await?;
            if let Some(result) = &store.state().analysis_result {
                print_value(json, result, render_result)?;
            }
        }
        Command::Watch { job_id } => {
            watch_job(&mut store, &config, JobId::from(job_id), json).await?;
        }
        Command::Knowledge(KnowledgeCommand::List) => {
            store.fetch_knowledge_files().await?;
            print_list(json, &store.state().knowledge_files, render_knowledge, "no knowledge files")?;
        }
        Command::Knowledge(KnowledgeCommand::Upload { file }) => {
            upload_knowledge(&mut store, &file, json).await?;
        }
        Command::Knowledge(KnowledgeCommand::Search { query }) => {
            store.search_knowledge(&query).await?;
            print_list(json, &store.state().knowledge_files, render_knowledge, "no matches")?;
        }
    }

    Ok(())
}

async fn upload_knowledge(store: &mut AppStore, file: &Path, json: bool) -> anyhow::Result<()> {
    store
        .upload_knowledge_file(file)
        .await
        .with_context(|| format!("uploading {}", file.display()))?;
    print_list(json, &store.state().knowledge_files, render_knowledge, "no knowledge files")
}

/// Follows a job's status stream until it completes, fails or the user
/// interrupts. The subscription is released on every exit path.
async fn watch_job(
    store: &mut AppStore,
    config: &Config,
    job_id: JobId,
    json: bool,
) -> anyhow::Result<()> {
    // A job that already finished has nothing left to stream.
    match store.fetch_analysis_status(&job_id).await {
        Ok(()) => {
            let status = store.state().analysis.as_ref().map(|a| a.status);
            if let Some(status) = status
                && status.is_terminal()
            {
                info!(job = %job_id, %status, "job already finished");
                return finish(store, &job_id, status, json).await;
            }
        }
        Err(e) => warn!(job = %job_id, error = %e, "could not fetch job status, watching anyway"),
    }

    let mut subscription = JobSubscription::new(config.channel_config());
    let (_sender, mut messages) = subscription.subscribe_channel(job_id.clone()).await;
    let mut events = match subscription.manager() {
        Some(manager) => manager.take_events().await,
        None => None,
    };
    info!(job = %job_id, "watching job status");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            msg = messages.recv() => {
                let Some(msg) = msg else { break None };
                if json {
                    println!("{}", serde_json::to_string(&msg)?);
                }
                let progress = store.state_mut().apply_status(&job_id, &msg);
                if !json {
                    println!("{}", render_progress(&job_id, progress));
                }
                if progress.is_terminal() {
                    break Some(progress.status);
                }
            }
            Some(event) = recv_event(&mut events) => log_event(&event),
            _ = &mut ctrl_c => {
                info!("interrupted");
                break None;
            }
        }
    };

    subscription.unsubscribe();

    match outcome {
        Some(status) => finish(store, &job_id, status, json).await,
        None => Ok(()),
    }
}

async fn recv_event(
    events: &mut Option<tokio::sync::mpsc::Receiver<ConnectionEvent>>,
) -> Option<ConnectionEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn log_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::StateChanged { job_id, state } => {
            debug!(job = %job_id, ?state, "status stream state");
        }
        ConnectionEvent::Reconnecting {
            job_id,
            attempt,
            next_retry_secs,
        } => {
            eprintln!("status stream for {job_id} lost, retrying in {next_retry_secs:.0}s (attempt {attempt})");
        }
        ConnectionEvent::MalformedFrame { job_id, error } => {
            debug!(job = %job_id, %error, "skipped malformed status frame");
        }
    }
}

/// Prints the outcome of a finished job.
async fn finish(
    store: &mut AppStore,
    job_id: &JobId,
    status: JobStatus,
    json: bool,
) -> anyhow::Result<()> {
    if status != JobStatus::Completed {
        let reason = store
            .state()
            .job(job_id)
            .and_then(|p| p.error.clone())
            .unwrap_or_else(|| "no reason given".into());
        anyhow::bail!("analysis {job_id} failed: {reason}");
    }

    store.fetch_analysis_result(job_id).await?;
    if let Some(result) = &store.state().analysis_result {
        print_value(json, result, render_result)?;
    }
    Ok(())
}

fn print_value<T: Serialize>(json: bool, value: &T, render: fn(&T) -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", render(value));
    }
    Ok(())
}

fn print_list<T: Serialize>(
    json: bool,
    items: &[T],
    render: fn(&T) -> String,
    empty: &str,
) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else if items.is_empty() {
        println!("{empty}");
    } else {
        for item in items {
            println!("{}", render(item));
        }
    }
    Ok(())
}

fn render_deck(deck: &Deck) -> String {
    let mut out = format!("{}  {} ({})", deck.id, deck.name, deck.startup_name);
    if let Some(status) = deck.status {
        let _ = write!(out, "  [{status}]");
    }
    let _ = write!(out, "  {}", deck.created_at);
    out
}

fn render_analysis(analysis: &Analysis) -> String {
    let mut out = format!(
        "job {}  deck {}  {}  started {}",
        analysis.id, analysis.deck_id, analysis.status, analysis.created_at
    );
    if let Some(done) = &analysis.completed_at {
        let _ = write!(out, "  finished {done}");
    }
    out
}

fn render_result(result: &AnalysisResult) -> String {
    let mut out = format!("deck {}  score {:.1}\n", result.deck_id, result.score);
    if !result.insights.is_empty() {
        out.push_str("insights:\n");
        for insight in &result.insights {
            let _ = writeln!(out, "  - {insight}");
        }
    }
    if !result.recommendations.is_empty() {
        out.push_str("recommendations:\n");
        for rec in &result.recommendations {
            let _ = writeln!(out, "  - {rec}");
        }
    }
    out.trim_end().to_string()
}

fn render_knowledge(file: &KnowledgeFile) -> String {
    format!(
        "{}  {}  {}  {} bytes  {}",
        file.id, file.name, file.file_type, file.size, file.uploaded_at
    )
}

fn render_progress(job_id: &JobId, progress: &JobProgress) -> String {
    let mut out = format!("{job_id}  {}", progress.status);
    if let Some(pct) = progress.percent {
        let _ = write!(out, "  {pct:.0}%");
    }
    if let Some(detail) = &progress.detail {
        let _ = write!(out, "  {detail}");
    }
    if let Some(error) = &progress.error {
        let _ = write!(out, "  error: {error}");
    }
    out
}
