use anyhow::Result;
use futures_util::StreamExt;
use vmledger_common::bus::{CommandSyncPortMappings, CommandType, CHANNEL_ORCHESTRATOR_COMMANDS};

use crate::sync_job::{self, SyncContext};
use crate::task_reporter::TASK_TYPE_SYNC_PORT_MAPPINGS;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SyncPortMappings(CommandSyncPortMappings),
    SyncAllProviders,
}

/// `None` for payloads that are not JSON, carry another `type`, or do not
/// match the command shape. Other components publish on the same channel.
pub fn parse_command(payload: &str) -> Option<Command> {
    let event: serde_json::Value = serde_json::from_str(payload).ok()?;
    let command_type = CommandType::parse(event["type"].as_str().unwrap_or(""))?;

    match command_type {
        CommandType::SyncPortMappings => serde_json::from_value(event)
            .ok()
            .map(Command::SyncPortMappings),
        CommandType::SyncAllProviders => Some(Command::SyncAllProviders),
    }
}

/// Listens on the orchestrator channel until the context is cancelled.
pub async fn listen(redis_client: redis::Client, ctx: SyncContext) -> Result<()> {
    // Use dedicated PubSub connection
    let mut pubsub = redis_client.get_async_pubsub().await?;
    pubsub.subscribe(CHANNEL_ORCHESTRATOR_COMMANDS).await?;
    tracing::info!(
        channel = CHANNEL_ORCHESTRATOR_COMMANDS,
        "listening for orchestrator commands"
    );

    let mut stream = pubsub.on_message();
    loop {
        let msg = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            msg = stream.next() => msg,
        };
        let Some(msg) = msg else {
            tracing::warn!("redis pubsub stream closed");
            break;
        };
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable pubsub payload");
                continue;
            }
        };
        if let Some(command) = parse_command(&payload) {
            dispatch(&ctx, command).await;
        }
    }

    Ok(())
}

async fn dispatch(ctx: &SyncContext, command: Command) {
    match command {
        Command::SyncPortMappings(cmd) => {
            tracing::info!(
                provider_id = %cmd.provider_id,
                correlation_id = cmd.correlation_id.as_deref().unwrap_or(""),
                "received CMD:SYNC_PORT_MAPPINGS"
            );
            let task_id = match cmd.task_id {
                Some(id) => Some(id),
                None => match ctx
                    .driver
                    .reporter()
                    .create_task(cmd.provider_id, TASK_TYPE_SYNC_PORT_MAPPINGS)
                    .await
                {
                    Ok(id) => Some(id),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to create sync task, running untracked");
                        None
                    }
                },
            };
            let ctx = ctx.clone();
            tokio::spawn(async move {
                if let Err(e) = sync_job::sync_provider(&ctx, cmd.provider_id, task_id).await {
                    tracing::warn!(provider_id = %cmd.provider_id, error = %e, "CMD:SYNC_PORT_MAPPINGS failed");
                }
            });
        }
        Command::SyncAllProviders => {
            tracing::info!("received CMD:SYNC_ALL_PROVIDERS");
            let ctx = ctx.clone();
            tokio::spawn(async move {
                if let Err(e) = sync_job::sync_all_providers(&ctx).await {
                    tracing::error!(error = %e, "CMD:SYNC_ALL_PROVIDERS failed");
                }
            });
        }
    }
}
