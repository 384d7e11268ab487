//! Alternate generator: consumes message files written by an external
//! text generator.
//!
//! Layout, relative to the generator base directory:
//! - `models/<community>/<author>/`: the author has a trained external model
//! - `messages/<community>/<author>/<n>.txt`: generated lines, waiting to be used
//!
//! Authors owning an external model are left out of Markov selection.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::ids::{AuthorId, CommunityId};
use crate::io::{list_dirs, list_files, read_lines, write_lines};

const CONJUNCTIONS: [&str; 7] = ["for", "and", "nor", "but", "or", "yet", "so"];

/// Tells which authors a generator takes care of in a community.
pub trait AuthorOwnership: Send + Sync {
	fn owned_authors(&self, community: CommunityId) -> io::Result<HashSet<AuthorId>>;
}

/// A second message generator, tried when the Markov one is not picked or
/// has nothing to say.
pub trait AlternateGenerator: AuthorOwnership {
	/// Returns an author and a message they "said", or `None` when there is nothing to use.
	fn message_for_community(&self, community: CommunityId) -> io::Result<Option<(AuthorId, String)>>;
}

/// Owns nobody and never produces anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAlternate;

impl AuthorOwnership for NoAlternate {
	fn owned_authors(&self, _community: CommunityId) -> io::Result<HashSet<AuthorId>> {
		Ok(HashSet::new())
	}
}

impl AlternateGenerator for NoAlternate {
	fn message_for_community(&self, _community: CommunityId) -> io::Result<Option<(AuthorId, String)>> {
		Ok(None)
	}
}

/// Reads pre-generated lines from disk, one group of related lines at a time.
///
/// Every read removes the lines it used, so each line is posted at most once.
/// A single lock serialises all file consumption.
#[derive(Debug)]
pub struct LineFileGenerator {
	base: PathBuf,
	lock: Mutex<()>,
}

impl LineFileGenerator {
	pub fn new<P: Into<PathBuf>>(base: P) -> Self {
		Self { base: base.into(), lock: Mutex::new(()) }
	}

	fn models_dir(&self, community: CommunityId) -> PathBuf {
		self.base.join("models").join(community.to_string())
	}

	fn messages_dir(&self, community: CommunityId) -> PathBuf {
		self.base.join("messages").join(community.to_string())
	}
}

fn author_dirs(dir: PathBuf) -> io::Result<Vec<(AuthorId, PathBuf)>> {
	Ok(list_dirs(&dir)?
		.into_iter()
		.filter_map(|name| {
			let author = name.parse::<AuthorId>().ok()?;
			Some((author, dir.join(name)))
		})
		.collect())
}

impl AuthorOwnership for LineFileGenerator {
	fn owned_authors(&self, community: CommunityId) -> io::Result<HashSet<AuthorId>> {
		Ok(author_dirs(self.models_dir(community))?
			.into_iter()
			.map(|(author, _)| author)
			.collect())
	}
}

impl AlternateGenerator for LineFileGenerator {
	fn message_for_community(&self, community: CommunityId) -> io::Result<Option<(AuthorId, String)>> {
		let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
		let mut rng = rand::rng();

		let authors = author_dirs(self.messages_dir(community))?;
		let Some((author, author_dir)) = authors.choose(&mut rng) else {
			return Ok(None);
		};

		let files = list_files(author_dir, "txt")?;
		let Some(file) = files.choose(&mut rng) else {
			return Ok(None);
		};
		let path = author_dir.join(file);

		let mut lines = read_lines(&path)?;
		if lines.is_empty() {
			return Ok(None);
		}

		let mut taken = 1;
		while taken < lines.len() && should_group_messages(&lines[taken - 1], &lines[taken], &mut rng) {
			taken += 1;
		}
		let rest = lines.split_off(taken);

		if rest.is_empty() {
			fs::remove_file(&path)?;
		} else {
			write_lines(&path, &rest)?;
		}

		log::debug!("Used {taken} lines from {}", path.display());
		Ok(Some((*author, lines.join("\n"))))
	}
}

fn words(message: &str) -> Vec<&str> {
	message.split(|c: char| !c.is_alphanumeric()).collect()
}

/// Guesses whether `second` continues `first` and both should be posted together.
pub fn should_group_messages<R: Rng + ?Sized>(first: &str, second: &str, rng: &mut R) -> bool {
	let first = first.trim().to_lowercase();
	let second = second.trim().to_lowercase();

	let words1 = words(&first);
	let words2 = words(&second);
	let (Some(head1), Some(head2), Some(tail1)) = (words1.first(), words2.first(), words1.last()) else {
		return false;
	};

	// Same opening word, unless it is a link or "i"
	if head1 == head2 && !matches!(*head1, "http" | "https" | "i") {
		return true;
	}

	if CONJUNCTIONS.contains(head2) {
		return true;
	}

	// Greentext
	if first.starts_with('>') {
		return true;
	}

	// Numbered list
	if head1.parse::<i64>().is_ok() && head2.parse::<i64>().is_ok() {
		return true;
	}

	if first.ends_with(':') {
		return true;
	}

	// Side note
	if second.starts_with('(') && second.ends_with(')') {
		return true;
	}

	if *tail1 == "like" {
		return true;
	}

	words1.len() <= 2 && rng.random_range(0..3) == 0
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;
	use tempfile::TempDir;

	#[test]
	fn grouping_rules() {
		let mut rng = StdRng::seed_from_u64(0);
		assert!(should_group_messages("pizza is great", "pizza is life", &mut rng));
		assert!(!should_group_messages("https://a.b/c is cool", "https://d.e also cool stuff", &mut rng));
		assert!(should_group_messages("i went out today", "and it rained a lot", &mut rng));
		assert!(should_group_messages(">be me today", "no idea what to write here", &mut rng));
		assert!(should_group_messages("1. eggs", "2. milk", &mut rng));
		assert!(should_group_messages("my list of things:", "nothing at all", &mut rng));
		assert!(should_group_messages("i went out today", "(not really)", &mut rng));
		assert!(should_group_messages("it was like", "whoa totally unexpected", &mut rng));
		assert!(!should_group_messages("this is a long message", "completely unrelated words here", &mut rng));
	}

	#[test]
	fn short_messages_group_sometimes() {
		let mut rng = StdRng::seed_from_u64(11);
		let grouped = (0..3000)
			.filter(|_| should_group_messages("ok", "sure thing then", &mut rng))
			.count();
		assert!((800..1200).contains(&grouped), "grouped {grouped} times");
	}

	#[test]
	fn ownership_comes_from_model_dirs() {
		let td = TempDir::new().unwrap();
		let base = td.path();
		fs::create_dir_all(base.join("models/1/42")).unwrap();
		fs::create_dir_all(base.join("models/1/not-an-id")).unwrap();

		let generator = LineFileGenerator::new(base);
		assert_eq!(generator.owned_authors(CommunityId(1)).unwrap(), HashSet::from([AuthorId(42)]));
		assert!(generator.owned_authors(CommunityId(2)).unwrap().is_empty());
	}

	#[test]
	fn lines_are_consumed() {
		let td = TempDir::new().unwrap();
		let base = td.path();
		let dir = base.join("messages/1/42");
		fs::create_dir_all(&dir).unwrap();
		fs::write(dir.join("0.txt"), "first list:\nsecond\nthis one stands completely alone\n").unwrap();

		let generator = LineFileGenerator::new(base);
		let (author, message) = generator.message_for_community(CommunityId(1)).unwrap().unwrap();
		assert_eq!(author, AuthorId(42));
		assert!(message.starts_with("first list:\nsecond"));

		// Every line is handed out exactly once, then the file is gone
		let mut seen = message.lines().count();
		while let Some((_, next)) = generator.message_for_community(CommunityId(1)).unwrap() {
			seen += next.lines().count();
		}
		assert_eq!(seen, 3);
		assert!(!dir.join("0.txt").exists());
	}

	#[test]
	fn nothing_to_read() {
		let td = TempDir::new().unwrap();
		let generator = LineFileGenerator::new(td.path());
		assert!(generator.message_for_community(CommunityId(1)).unwrap().is_none());
		assert!(NoAlternate.message_for_community(CommunityId(1)).unwrap().is_none());
	}
}
