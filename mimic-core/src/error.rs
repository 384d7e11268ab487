//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while sampling from a [`MarkovModel`](crate::model::markov_model::MarkovModel).
#[derive(Debug, Error)]
pub enum ModelError {
	/// A node had outgoing edges whose weights summed to zero.
	/// Weights are always >= 1, so this means the model is inconsistent.
	#[error("node {word:?} has edges but a total weight of zero")]
	EmptyDistribution { word: String },

	#[error("weights of node {word:?} overflow")]
	WeightOverflow { word: String },
}

/// Errors raised by the [`ModelStore`](crate::store::ModelStore).
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	/// The file exists but does not decode as a model (or message list).
	#[error("corrupt file {}: {source}", path.display())]
	Corrupt {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
}

/// Errors raised by a history source outside of page fetches.
#[derive(Debug, Error)]
pub enum HistoryError {
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	#[error("invalid history data: {0}")]
	Format(#[from] serde_json::Error),

	#[error("unknown community {0}")]
	UnknownCommunity(String),

	#[error("{0}")]
	Other(String),
}

/// Errors that abort a whole corpus pass.
#[derive(Debug, Error)]
pub enum BuildError {
	#[error("cannot list channels: {0}")]
	History(#[from] HistoryError),

	#[error("corpus pass cancelled")]
	Cancelled,

	#[error("cannot merge partial builds: {0}")]
	Merge(String),
}

/// Errors raised by the runtime responder.
#[derive(Debug, Error)]
pub enum ResponderError {
	#[error("only the bot owner may force a generated message")]
	Unauthorized,

	#[error(transparent)]
	Generation(#[from] GenerationError),
}

/// Errors raised while producing a message for a community.
#[derive(Debug, Error)]
pub enum GenerationError {
	#[error(transparent)]
	Store(#[from] StoreError),

	#[error(transparent)]
	Model(#[from] ModelError),

	/// An author was listed as eligible but their model could not be found.
	#[error("model for author {0} disappeared between listing and loading")]
	MissingModel(String),

	#[error("alternate generator failed: {0}")]
	Alternate(#[from] io::Error),
}
