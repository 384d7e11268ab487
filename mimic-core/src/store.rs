//! On-disk persistence of Markov models and raw messages.
//!
//! Layout, relative to the store base directory:
//! - `<community>/global.json`: aggregate model of a community
//! - `<community>/<author>.json`: one model per author
//! - `<community>/<author>_messages.json`: that author's raw messages

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::ids::{AuthorId, CommunityId};
use crate::io::{get_filename, list_files};
use crate::model::markov_model::MarkovModel;

const GLOBAL_MODEL: &str = "global";
const MESSAGES_SUFFIX: &str = "_messages";

/// File-backed model storage rooted at a base directory.
///
/// The store does no locking: callers serialise access to a given file
/// (the server holds one lock around rebuild saves and model loads).
#[derive(Clone, Debug)]
pub struct ModelStore {
	base: PathBuf,
}

impl ModelStore {
	pub fn new<P: Into<PathBuf>>(base: P) -> Self {
		Self { base: base.into() }
	}

	pub fn base(&self) -> &Path {
		&self.base
	}

	pub fn community_dir(&self, community: CommunityId) -> PathBuf {
		self.base.join(community.to_string())
	}

	pub fn model_path(&self, community: CommunityId, author: AuthorId) -> PathBuf {
		self.community_dir(community).join(format!("{author}.json"))
	}

	pub fn global_path(&self, community: CommunityId) -> PathBuf {
		self.community_dir(community).join(format!("{GLOBAL_MODEL}.json"))
	}

	pub fn messages_path(&self, community: CommunityId, author: AuthorId) -> PathBuf {
		self.community_dir(community).join(format!("{author}{MESSAGES_SUFFIX}.json"))
	}

	/// Writes an author's model, replacing any previous one.
	pub fn save(&self, community: CommunityId, author: AuthorId, model: &MarkovModel) -> Result<(), StoreError> {
		write_json(&self.model_path(community, author), model)
	}

	/// Reads an author's model. `Ok(None)` means no model was ever saved.
	///
	/// # Errors
	/// A file that exists but does not decode is [`StoreError::Corrupt`].
	pub fn load(&self, community: CommunityId, author: AuthorId) -> Result<Option<MarkovModel>, StoreError> {
		read_json(&self.model_path(community, author))
	}

	pub fn save_global(&self, community: CommunityId, model: &MarkovModel) -> Result<(), StoreError> {
		write_json(&self.global_path(community), model)
	}

	pub fn load_global(&self, community: CommunityId) -> Result<Option<MarkovModel>, StoreError> {
		read_json(&self.global_path(community))
	}

	/// Writes the ordered list of an author's raw messages.
	pub fn save_raw_messages(&self, community: CommunityId, author: AuthorId, messages: &[String]) -> Result<(), StoreError> {
		write_json(&self.messages_path(community, author), &messages)
	}

	pub fn load_raw_messages(&self, community: CommunityId, author: AuthorId) -> Result<Option<Vec<String>>, StoreError> {
		read_json(&self.messages_path(community, author))
	}

	/// Lists authors of `community` that have a saved model, minus `exclude`.
	///
	/// Only `<numeric id>.json` files count: the global model and the raw
	/// message lists are never listed. A community without a directory has
	/// no eligible author.
	pub fn list_eligible_authors(
		&self,
		community: CommunityId,
		exclude: &HashSet<AuthorId>,
	) -> Result<HashSet<AuthorId>, StoreError> {
		let mut authors = HashSet::new();
		for file in list_files(self.community_dir(community), "json")? {
			let stem = get_filename(&file)?;
			let Ok(author) = stem.parse::<AuthorId>() else {
				continue;
			};
			// `load` rebuilds the path from the id, so `+5` or `007` would not be found.
			if author.to_string() != stem {
				continue;
			}
			if !exclude.contains(&author) {
				authors.insert(author);
			}
		}
		Ok(authors)
	}
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	let bytes = serde_json::to_vec_pretty(value).map_err(io::Error::from)?;
	fs::write(path, bytes)?;
	Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
	let bytes = match fs::read(path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
		Err(e) => return Err(e.into()),
	};

	serde_json::from_slice(&bytes)
		.map(Some)
		.map_err(|source| StoreError::Corrupt { path: path.to_owned(), source })
}
