use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use super::markov_model::END_WORD;

/// A word in a Markov chain, with its outgoing weighted edges.
///
/// Conceptually a vertex of the chain: every key of `weights` is a word
/// that was observed right after this one, and its value is how many times
/// that happened.
///
/// ## Invariants
/// - Every weight is strictly positive
/// - Weights only ever grow
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Node {
	#[serde(rename = "Word")]
	word: String,
	#[serde(rename = "Weights", default)]
	weights: HashMap<String, u64>,
}

impl Node {
	/// Creates a node with no outgoing edges.
	pub fn new(word: &str) -> Self {
		Self {
			word: word.to_owned(),
			weights: HashMap::new(),
		}
	}

	pub fn word(&self) -> &str {
		&self.word
	}

	/// Number of times `next_word` was observed after this word (0 if never).
	pub fn weight(&self, next_word: &str) -> u64 {
		self.weights.get(next_word).copied().unwrap_or(0)
	}

	/// Iterates over `(successor, weight)` pairs.
	pub fn edges(&self) -> impl Iterator<Item = (&str, u64)> {
		self.weights.iter().map(|(word, weight)| (word.as_str(), *weight))
	}

	pub fn edge_count(&self) -> usize {
		self.weights.len()
	}

	/// Records one more occurrence of `next_word` following this word.
	pub fn increment(&mut self, next_word: &str) {
		*self.weights.entry(next_word.to_owned()).or_insert(0) += 1;
	}

	/// Picks a successor by weighted random choice.
	///
	/// - No edges: the chain ends here, the End sentinel is returned.
	/// - One edge: that edge, no draw needed.
	/// - Otherwise each edge is chosen with probability `weight / total`.
	///
	/// Edges are laid out as a cumulative partition in iteration order and a
	/// draw in `[0, total)` is matched against it, scanning down from the
	/// highest partition.
	pub fn next_word<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&str, ModelError> {
		match self.weights.len() {
			0 => return Ok(END_WORD),
			1 => {
				if let Some(word) = self.weights.keys().next() {
					return Ok(word.as_str());
				}
			}
			_ => (),
		}

		let mut partition: Vec<(&str, u64)> = Vec::with_capacity(self.weights.len());
		let mut total: u64 = 0;
		for (word, weight) in &self.weights {
			total = total
				.checked_add(*weight)
				.ok_or_else(|| ModelError::WeightOverflow { word: self.word.clone() })?;
			partition.push((word.as_str(), total));
		}

		if total == 0 {
			return Err(ModelError::EmptyDistribution { word: self.word.clone() });
		}

		let draw = rng.random_range(0..total);
		let mut choice = None;
		for (word, cumulative) in partition.iter().rev() {
			if *cumulative <= draw {
				break;
			}
			choice = Some(*word);
		}

		choice.ok_or_else(|| ModelError::EmptyDistribution { word: self.word.clone() })
	}

	/// Adds the edge weights of `other` into this node.
	///
	/// Both nodes must stand for the same word.
	pub fn merge(&mut self, other: &Self) -> Result<(), String> {
		if self.word != other.word {
			return Err(format!("Word mismatch: {:?} vs {:?}", self.word, other.word));
		}

		for (next_word, weight) in &other.weights {
			let entry = self.weights.entry(next_word.clone()).or_insert(0);
			*entry = entry
				.checked_add(*weight)
				.ok_or_else(|| format!("Weight overflow on {:?} -> {:?}", self.word, next_word))?;
		}

		Ok(())
	}

	/// True when every stored weight is positive.
	pub(crate) fn has_valid_weights(&self) -> bool {
		self.weights.values().all(|weight| *weight > 0)
	}

	/// Sum of all edge weights, `None` when it does not fit in a `u64`.
	pub(crate) fn total_weight(&self) -> Option<u64> {
		self.weights.values().try_fold(0u64, |total, weight| total.checked_add(*weight))
	}
}
