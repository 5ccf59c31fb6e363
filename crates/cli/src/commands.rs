//! Runs one query against a freshly created session.

use std::sync::Arc;

use anyhow::{Context, bail};
use codelens_protocol::SessionStatus;
use codelens_runtime::{SessionManager, StaticToken, Transport, WebSocketTransport};
use serde_json::Value;

use crate::cli::{Cli, Commands};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
	let descriptor = cli.session.descriptor()?;
	let config = cli.config();

	let transport: Arc<dyn Transport> = Arc::new(WebSocketTransport::from_config(&config));
	let manager = SessionManager::builder(transport, StaticToken(cli.token.clone()))
		.config(config)
		.status_sink(|status: SessionStatus| tracing::info!(%status, "session status"))
		.build();

	let status = manager.create_new_session(descriptor).await;
	if status != SessionStatus::Ready {
		if let Err(e) = manager.close().await {
			tracing::debug!(error = %e, "closing after failed session creation");
		}
		bail!("session not ready: {status}");
	}

	let outcome = query(&manager, &cli.command).await;
	manager.close().await.context("failed to close session")?;

	let value = outcome?;
	println!("{}", serde_json::to_string_pretty(&value)?);
	Ok(())
}

async fn query(manager: &SessionManager, command: &Commands) -> anyhow::Result<Value> {
	let value = match command {
		Commands::Hover(args) => manager
			.get_hover(args.side, &args.path, args.line, args.character)
			.await
			.context("hover query failed")?,
		Commands::References(args) => manager
			.get_references(args.side, &args.path, args.line, args.character)
			.await
			.context("references query failed")?,
		Commands::Definition(args) => manager
			.get_definition(args.side, &args.path, args.line, args.character)
			.await
			.context("definition query failed")?,
		Commands::Contents(args) => {
			let contents = manager
				.get_file_contents(args.side, &args.path)
				.await
				.context("file contents query failed")?;
			serde_json::to_value(contents)?
		}
	};
	Ok(value)
}
