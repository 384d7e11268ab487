use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::alternate::AuthorOwnership;
use crate::error::GenerationError;
use crate::ids::{AuthorId, CommunityId};
use crate::store::ModelStore;

/// Picks a random author of a community and generates a message from their model.
///
/// # Responsibilities
/// - List eligible authors: saved model, not owned by the alternate generator
/// - Pick one uniformly at random and load their model
/// - Generate one message and report who "said" it
///
/// Stateless apart from the store and the random source.
#[derive(Clone)]
pub struct MessageGenerator {
	store: ModelStore,
	exclusions: Arc<dyn AuthorOwnership>,
}

impl MessageGenerator {
	/// `exclusions` lists the authors another generator takes care of.
	pub fn new(store: ModelStore, exclusions: Arc<dyn AuthorOwnership>) -> Self {
		Self { store, exclusions }
	}

	pub fn store(&self) -> &ModelStore {
		&self.store
	}

	/// Authors with a saved model, minus the excluded ones.
	pub fn eligible_authors(&self, community: CommunityId) -> Result<HashSet<AuthorId>, GenerationError> {
		let excluded = self.exclusions.owned_authors(community)?;
		Ok(self.store.list_eligible_authors(community, &excluded)?)
	}

	/// Generates a message for `community` using the thread-local RNG.
	pub fn message_for_community(&self, community: CommunityId) -> Result<Option<(AuthorId, String)>, GenerationError> {
		self.message_for_community_with(community, &mut rand::rng())
	}

	/// Generates a message for `community`.
	///
	/// # Returns
	/// - `Ok(None)` when no author is eligible
	/// - `Ok(Some((author, text)))` otherwise. `text` may be empty, which
	///   callers treat like `None`.
	///
	/// # Errors
	/// A listed author whose model is missing or corrupt is an error.
	pub fn message_for_community_with<R: Rng + ?Sized>(
		&self,
		community: CommunityId,
		rng: &mut R,
	) -> Result<Option<(AuthorId, String)>, GenerationError> {
		let mut authors: Vec<AuthorId> = self.eligible_authors(community)?.into_iter().collect();
		// Stable order so a seeded RNG always picks the same author
		authors.sort_unstable();

		let Some(&author) = authors.choose(rng) else {
			return Ok(None);
		};

		let model = self
			.store
			.load(community, author)?
			.ok_or_else(|| GenerationError::MissingModel(author.to_string()))?;

		Ok(Some((author, model.generate_with(rng)?)))
	}

	/// Generates a message from one given author's model.
	///
	/// Returns `Ok(None)` when that author has no model.
	pub fn mimic(&self, community: CommunityId, author: AuthorId) -> Result<Option<String>, GenerationError> {
		match self.store.load(community, author)? {
			Some(model) => Ok(Some(model.generate()?)),
			None => Ok(None),
		}
	}
}
