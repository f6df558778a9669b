//! AMS command-line entry point.

use std::io::Write;

use ams_cache::CacheRead;
use ams_client::api::Endpoint;
use ams_client::cli::{Command, Invocation};
use ams_client::client::AmsClient;
use ams_client::config::ClientConfig;
use ams_client::error::ClientError;
use ams_client::orchestrator::FetchOptions;
use ams_client::stream::StreamState;
use ams_client::telemetry::init_tracing;
use ams_core::{AgentEventKind, AmsError, AmsResult};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    init_tracing()?;
    let invocation = Invocation::parse(std::env::args().skip(1))?;
    let config = ClientConfig::load()?;
    let client = AmsClient::from_config(&config)?;

    match invocation.command.clone() {
        Command::Kpis => print_endpoint::<ams_core::OverallKpis>(&client, &invocation, Endpoint::OverallKpis).await?,
        Command::Sources => print_endpoint::<ams_core::PerSourceKpis>(&client, &invocation, Endpoint::PerSourceKpis).await?,
        Command::Floods => print_endpoint::<ams_core::FloodWindows>(&client, &invocation, Endpoint::FloodWindows).await?,
        Command::BadActors => print_endpoint::<ams_core::BadActors>(&client, &invocation, Endpoint::BadActors).await?,
        Command::Priorities => print_endpoint::<ams_core::PriorityBreakdown>(&client, &invocation, Endpoint::PriorityBreakdown).await?,
        Command::Conditions => print_endpoint::<ams_core::ConditionBreakdown>(&client, &invocation, Endpoint::ConditionBreakdown).await?,
        Command::Alarms => print_endpoint::<ams_core::AlarmRecordPage>(&client, &invocation, Endpoint::Alarms).await?,
        Command::Refresh => {
            let report = client.alarms().refresh();
            println!(
                "evicted {} memory and {} persisted entries",
                report.memory, report.persisted
            );
        }
        Command::Regenerate => {
            let response = client.alarms().regenerate().await?;
            print_json(&response)?;
        }
        Command::Ask(question) => ask(&client, &question).await?,
    }

    let stats = client.cache().stats();
    info!(
        memory_hits = stats.memory_hits,
        persisted_hits = stats.persisted_hits,
        misses = stats.misses,
        "cache stats"
    );
    Ok(())
}

async fn print_endpoint<T>(
    client: &AmsClient,
    invocation: &Invocation,
    endpoint: Endpoint,
) -> Result<(), ClientError>
where
    T: DeserializeOwned + Serialize,
{
    let read: AmsResult<CacheRead<T>> = if invocation.fresh {
        client
            .alarms()
            .get_with(endpoint, &invocation.query, FetchOptions::refresh())
            .await
    } else {
        client.alarms().get(endpoint, &invocation.query).await
    };
    let read = read?;
    info!(
        source = ?read.source(),
        age_ms = read.staleness().as_millis() as u64,
        "served {}",
        endpoint.suffix()
    );
    print_json(read.value())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ClientError> {
    let text = serde_json::to_string_pretty(value).map_err(AmsError::from)?;
    println!("{}", text);
    Ok(())
}

/// Stream the agent's answer to stdout. Ctrl-C aborts the session.
async fn ask(client: &AmsClient, question: &str) -> Result<(), ClientError> {
    let mut stream = client.ask(question, Uuid::now_v7().to_string())?;

    let abort = stream.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let mut stdout = std::io::stdout();
    while let Some(item) = stream.next().await {
        let event = item?;
        match event.kind {
            AgentEventKind::AnswerStream => {
                if let Some(text) = event.text() {
                    write!(stdout, "{}", text)?;
                    stdout.flush()?;
                }
            }
            AgentEventKind::Reasoning | AgentEventKind::ToolCall | AgentEventKind::ToolResult => {
                if let Some(text) = event.text() {
                    eprintln!("[{:?}] {}", event.kind, text);
                }
            }
            AgentEventKind::Error => {
                eprintln!("[agent error] {}", event.text().unwrap_or("unknown error"));
            }
            AgentEventKind::AnswerComplete
            | AgentEventKind::ToolCallUpdate
            | AgentEventKind::Complete => {}
        }
    }
    writeln!(stdout)?;

    if let StreamState::Aborted(reason) = stream.finished().await {
        eprintln!("[stream aborted: {}]", reason);
    }
    Ok(())
}
