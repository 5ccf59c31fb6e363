use std::time::Duration;

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use codelens_protocol::{RepoSide, SessionDescriptor};
use codelens_runtime::SessionConfig;
use codelens_runtime::config::{DEFAULT_GIT_SERVICE, DEFAULT_ROOT_URL};

#[derive(Parser, Debug)]
#[command(name = "codelens")]
#[command(about = "Query code intelligence for a repository through the codelens analysis service")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Root URL of the analysis service
	#[arg(long, global = true, env = "CODELENS_URL", default_value = DEFAULT_ROOT_URL)]
	pub url: String,

	/// Token passed to the service when connecting
	#[arg(long, global = true, env = "CODELENS_TOKEN", hide_env_values = true, default_value = "")]
	pub token: String,

	/// Git hosting service the repository lives on
	#[arg(long, global = true, default_value = DEFAULT_GIT_SERVICE)]
	pub service: String,

	/// Base reconnection delay in milliseconds
	#[arg(long, global = true, value_name = "MS", default_value_t = 1000)]
	pub base_delay: u64,

	#[command(flatten)]
	pub session: SessionArgs,

	#[command(subcommand)]
	pub command: Commands,
}

impl Cli {
	pub fn config(&self) -> SessionConfig {
		SessionConfig::default()
			.with_root_url(self.url.clone())
			.with_git_service(self.service.clone())
			.with_base_delay(Duration::from_millis(self.base_delay))
	}
}

/// Which code the session analyses.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
	/// Repository owner
	#[arg(long = "org", global = true, value_name = "ORG")]
	pub organisation: Option<String>,

	/// Repository name
	#[arg(long = "repo", global = true, value_name = "NAME")]
	pub name: Option<String>,

	/// Pull request number
	#[arg(long = "pr", global = true, value_name = "NUMBER", conflicts_with = "head")]
	pub pull_request: Option<u64>,

	/// Head commit
	#[arg(long, global = true, value_name = "SHA")]
	pub head: Option<String>,

	/// Base commit, compared against --head
	#[arg(long, global = true, value_name = "SHA", requires = "head")]
	pub base: Option<String>,
}

impl SessionArgs {
	/// Descriptor for the session these flags describe.
	///
	/// `--pr` selects a pull request, `--head` with `--base` a comparison, and
	/// `--head` alone a single commit.
	pub fn descriptor(&self) -> anyhow::Result<SessionDescriptor> {
		let (Some(organisation), Some(name)) = (&self.organisation, &self.name) else {
			bail!("--org and --repo are required");
		};

		let descriptor = match (self.pull_request, &self.head, &self.base) {
			(Some(pull_request), _, _) => SessionDescriptor::pull(organisation, name, pull_request),
			(None, Some(head), Some(base)) => SessionDescriptor::compare(organisation, name, head, base),
			(None, Some(head), None) => SessionDescriptor::file(organisation, name, head),
			(None, None, _) => bail!("one of --pr or --head is required"),
		};
		Ok(descriptor)
	}
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Hover information at a position
	Hover(PositionArgs),
	/// All references to the symbol at a position
	References(PositionArgs),
	/// Definition of the symbol at a position
	Definition(PositionArgs),
	/// Full contents of a file
	Contents(FileArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PositionArgs {
	/// Path of the file within the repository
	pub path: String,
	/// Line number as the service counts it
	pub line: u32,
	/// Character offset within the line
	pub character: u32,
	/// Side of the comparison to query (base or head)
	#[arg(long, default_value = "head")]
	pub side: RepoSide,
}

#[derive(Args, Debug, Clone)]
pub struct FileArgs {
	/// Path of the file within the repository
	pub path: String,
	/// Side of the comparison to query (base or head)
	#[arg(long, default_value = "head")]
	pub side: RepoSide,
}
