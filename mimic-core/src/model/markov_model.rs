use std::collections::HashMap;

use rand::Rng;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ModelError;
use super::node::Node;

/// Word of the Start sentinel. Tokenisation never yields an empty token.
pub const START_WORD: &str = "";

/// Word of the End sentinel. Tokenisation strips NUL from every token.
pub const END_WORD: &str = "\0";

/// Hard limit on the number of words of one generated message.
///
/// Generation stops and returns what it has once the limit is reached,
/// so a cyclic model cannot loop forever.
pub const MAX_GENERATED_WORDS: usize = 2000;

/// A first-order, word-level Markov chain.
///
/// Every distinct word maps to a [`Node`] holding its successors and how
/// often each one was observed. Two sentinel nodes are always present:
/// Start (`""`) and End (`"\0"`). A message is a walk from Start to End.
///
/// # Responsibilities
/// - Count word transitions while a corpus is read
/// - Generate a message by a weighted random walk
/// - Merge with another model (parallel corpus passes)
///
/// # Invariants
/// - Start and End nodes exist
/// - Every edge weight is >= 1 and is never decremented
/// - A node is stored under its own word
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ModelFile")]
pub struct MarkovModel {
	words: HashMap<String, Node>,
}

/// On-disk shape of a model. The `Start`/`End` copies written next to
/// `Words` are ignored when reading: both sentinels are looked up in `Words`.
#[derive(Deserialize)]
struct ModelFile {
	#[serde(rename = "Words", default)]
	words: HashMap<String, Node>,
}

impl TryFrom<ModelFile> for MarkovModel {
	type Error = String;

	fn try_from(file: ModelFile) -> Result<Self, Self::Error> {
		for (key, node) in &file.words {
			if key != node.word() {
				return Err(format!("node {:?} stored under key {:?}", node.word(), key));
			}
			if !node.has_valid_weights() {
				return Err(format!("node {key:?} has a zero weight"));
			}
			if node.total_weight().is_none() {
				return Err(format!("node {key:?} weights overflow"));
			}
		}

		let mut model = Self { words: file.words };
		model.get_or_create_node(START_WORD);
		model.get_or_create_node(END_WORD);
		Ok(model)
	}
}

impl Serialize for MarkovModel {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut file = serializer.serialize_struct("MarkovModel", 3)?;
		file.serialize_field("Words", &self.words)?;
		file.serialize_field("Start", &self.words.get(START_WORD))?;
		file.serialize_field("End", &self.words.get(END_WORD))?;
		file.end()
	}
}

impl Default for MarkovModel {
	fn default() -> Self {
		Self::new()
	}
}

impl MarkovModel {
	/// Creates an empty model holding only the two sentinels.
	pub fn new() -> Self {
		let mut model = Self { words: HashMap::new() };
		model.get_or_create_node(START_WORD);
		model.get_or_create_node(END_WORD);
		model
	}

	/// Returns the node for `word`, creating an edgeless one if needed.
	pub fn get_or_create_node(&mut self, word: &str) -> &mut Node {
		self.words.entry(word.to_owned()).or_insert_with(|| Node::new(word))
	}

	pub fn node(&self, word: &str) -> Option<&Node> {
		self.words.get(word)
	}

	/// Weight of the edge `from -> to`, 0 when it was never observed.
	pub fn weight(&self, from: &str, to: &str) -> u64 {
		self.words.get(from).map_or(0, |node| node.weight(to))
	}

	/// Number of nodes, sentinels included.
	pub fn len(&self) -> usize {
		self.words.len()
	}

	/// True when nothing was ever observed after Start.
	pub fn is_empty(&self) -> bool {
		self.words.get(START_WORD).is_none_or(|node| node.edge_count() == 0)
	}

	/// Records one occurrence of `to` following `from`.
	pub fn observe_transition(&mut self, from: &str, to: &str) {
		self.get_or_create_node(to);
		self.get_or_create_node(from).increment(to);
	}

	/// Records a whole message: Start, every token in order, then End.
	///
	/// An empty token list records nothing.
	pub fn observe_sequence<S: AsRef<str>>(&mut self, tokens: &[S]) {
		let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
			return;
		};

		self.observe_transition(START_WORD, first.as_ref());
		for pair in tokens.windows(2) {
			self.observe_transition(pair[0].as_ref(), pair[1].as_ref());
		}
		self.observe_transition(last.as_ref(), END_WORD);
	}

	/// Generates one message using the thread-local RNG.
	pub fn generate(&self) -> Result<String, ModelError> {
		self.generate_with(&mut rand::rng())
	}

	/// Generates one message: a weighted random walk from Start to End.
	///
	/// Words are joined with a single space. An empty string is a valid
	/// result (Start has no edges). The walk is cut at
	/// [`MAX_GENERATED_WORDS`] words.
	pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<String, ModelError> {
		let mut words: Vec<&str> = Vec::new();
		let mut current = START_WORD;

		// A successor without a node of its own has no edges: it ends the walk.
		while let Some(node) = self.words.get(current) {
			let next = node.next_word(rng)?;
			if next == END_WORD {
				break;
			}
			if words.len() == MAX_GENERATED_WORDS {
				log::warn!("Generation cut after {MAX_GENERATED_WORDS} words");
				break;
			}
			words.push(next);
			current = next;
		}

		Ok(words.join(" "))
	}

	/// Merges another model into this one, summing edge weights.
	pub fn merge(&mut self, other: &Self) -> Result<(), String> {
		for (word, node) in &other.words {
			if let Some(existing) = self.words.get_mut(word) {
				existing.merge(node)?;
			} else {
				self.words.insert(word.clone(), node.clone());
			}
		}
		Ok(())
	}
}
