//! Session descriptors and repository sides.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Describes which analysis session to create.
///
/// The descriptor is tagged on `type` so it can be handed over as-is by page
/// adapters. Unknown `type` values deserialize to [`Unsupported`](Self::Unsupported)
/// instead of failing, and the session manager maps them to `no_session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionDescriptor {
	/// Session bound to a pull request.
	Pull {
		organisation: String,
		name: String,
		pull_request_id: u64,
	},
	/// Session bound to a single file at one revision.
	File {
		organisation: String,
		name: String,
		head_sha: String,
	},
	/// Session bound to a single commit against its parent.
	Commit {
		organisation: String,
		name: String,
		head_sha: String,
		base_sha: String,
	},
	/// Session bound to a comparison between two revisions.
	Compare {
		organisation: String,
		name: String,
		head_sha: String,
		base_sha: String,
	},
	/// Any descriptor type this client cannot create a session for.
	#[serde(other)]
	Unsupported,
}

impl SessionDescriptor {
	/// Shorthand for a pull request descriptor.
	pub fn pull(organisation: impl Into<String>, name: impl Into<String>, pull_request_id: u64) -> Self {
		Self::Pull {
			organisation: organisation.into(),
			name: name.into(),
			pull_request_id,
		}
	}

	/// Shorthand for a single-file descriptor.
	pub fn file(organisation: impl Into<String>, name: impl Into<String>, head_sha: impl Into<String>) -> Self {
		Self::File {
			organisation: organisation.into(),
			name: name.into(),
			head_sha: head_sha.into(),
		}
	}

	/// Shorthand for a compare descriptor.
	pub fn compare(
		organisation: impl Into<String>,
		name: impl Into<String>,
		head_sha: impl Into<String>,
		base_sha: impl Into<String>,
	) -> Self {
		Self::Compare {
			organisation: organisation.into(),
			name: name.into(),
			head_sha: head_sha.into(),
			base_sha: base_sha.into(),
		}
	}

	/// Wire name of the descriptor type.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Pull { .. } => "pull",
			Self::File { .. } => "file",
			Self::Commit { .. } => "commit",
			Self::Compare { .. } => "compare",
			Self::Unsupported => "unsupported",
		}
	}
}

/// Which side of a comparison a query refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoSide {
	Base,
	#[default]
	Head,
}

impl RepoSide {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Base => "base",
			Self::Head => "head",
		}
	}

	/// Value of the `is_base_repo` query field.
	pub fn is_base_repo(self) -> &'static str {
		match self {
			Self::Base => "true",
			Self::Head => "false",
		}
	}
}

impl fmt::Display for RepoSide {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for RepoSide {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"base" => Ok(Self::Base),
			"head" => Ok(Self::Head),
			other => Err(format!("unknown repository side '{other}' (expected 'base' or 'head')")),
		}
	}
}
