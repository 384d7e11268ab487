//! Corpus pass: folds a community's message history into Markov models.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use crate::error::{BuildError, StoreError};
use crate::history::{Channel, HistoryMessage, MessageSource, PageResult};
use crate::ids::{AuthorId, ChannelId, CommunityId, MessageId};
use crate::model::markov_model::{END_WORD, MarkovModel};
use crate::store::ModelStore;

/// Messages containing this are skipped (spoiler delimiters).
pub const DEFAULT_REDACTION_MARKER: &str = "||";

/// Largest page the chat platform hands out.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Tuning of a corpus pass.
#[derive(Clone, Debug)]
pub struct BuildOptions {
	/// Messages containing this substring are skipped. Empty disables the filter.
	pub redaction_marker: String,
	/// Messages requested per page.
	pub page_size: usize,
	/// Channels paginated at the same time. 1 reads channels one by one.
	pub parallelism: usize,
}

impl Default for BuildOptions {
	fn default() -> Self {
		Self {
			redaction_marker: DEFAULT_REDACTION_MARKER.to_owned(),
			page_size: DEFAULT_PAGE_SIZE,
			parallelism: num_cpus::get(),
		}
	}
}

/// Cooperative cancellation of a corpus pass.
///
/// Checked between page fetches; a fetch in flight always completes.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::Relaxed);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Relaxed)
	}
}

/// What a corpus pass learned about one author.
#[derive(Clone, Debug, Default)]
pub struct AuthorCorpus {
	pub model: MarkovModel,
	/// Raw content of every message that went into `model`, in reading order.
	pub messages: Vec<String>,
}

/// Result of a corpus pass: one global model plus one corpus per author.
#[derive(Clone, Debug, Default)]
pub struct CorpusBuild {
	pub global: MarkovModel,
	pub authors: HashMap<AuthorId, AuthorCorpus>,
}

/// Splits a message into whitespace-delimited words.
///
/// NUL is stripped from every word so the End sentinel can never be produced,
/// and empty words are dropped so neither can Start.
pub fn tokenize(content: &str) -> Vec<String> {
	content
		.split_whitespace()
		.map(|token| token.replace(END_WORD, ""))
		.filter(|token| !token.is_empty())
		.collect()
}

impl CorpusBuild {
	pub fn new() -> Self {
		Self::default()
	}

	/// Folds one message into the author's model and the global model.
	///
	/// Skipped (returns `false`): blank content, content holding the
	/// redaction marker, automated authors, and content without any word.
	/// Skipped messages are not recorded as raw messages either.
	pub fn add_message(&mut self, message: &HistoryMessage, redaction_marker: &str) -> bool {
		if message.automated
			|| message.content.trim().is_empty()
			|| (!redaction_marker.is_empty() && message.content.contains(redaction_marker))
		{
			return false;
		}

		let tokens = tokenize(&message.content);
		if tokens.is_empty() {
			return false;
		}

		let author = self.authors.entry(message.author).or_default();
		author.messages.push(message.content.clone());
		author.model.observe_sequence(&tokens);
		self.global.observe_sequence(&tokens);
		true
	}

	/// Appends a later partial build to this one.
	///
	/// Weights are summed; raw messages of `other` go after those already here.
	pub fn merge(&mut self, other: CorpusBuild) -> Result<(), String> {
		self.global.merge(&other.global)?;
		for (author, corpus) in other.authors {
			match self.authors.get_mut(&author) {
				Some(existing) => {
					existing.model.merge(&corpus.model)?;
					existing.messages.extend(corpus.messages);
				}
				None => {
					self.authors.insert(author, corpus);
				}
			}
		}
		Ok(())
	}

	pub fn author_model(&self, author: AuthorId) -> Option<&MarkovModel> {
		self.authors.get(&author).map(|corpus| &corpus.model)
	}

	pub fn raw_messages(&self, author: AuthorId) -> Option<&[String]> {
		self.authors.get(&author).map(|corpus| corpus.messages.as_slice())
	}

	/// Splits the build into the global model, per-author models and
	/// per-author raw messages.
	pub fn into_parts(self) -> (MarkovModel, HashMap<AuthorId, MarkovModel>, HashMap<AuthorId, Vec<String>>) {
		let mut models = HashMap::with_capacity(self.authors.len());
		let mut messages = HashMap::with_capacity(self.authors.len());
		for (author, corpus) in self.authors {
			models.insert(author, corpus.model);
			messages.insert(author, corpus.messages);
		}
		(self.global, models, messages)
	}

	/// Persists everything: global model, author models, raw message lists.
	pub fn save(&self, store: &ModelStore, community: CommunityId) -> Result<(), StoreError> {
		store.save_global(community, &self.global)?;
		for (author, corpus) in &self.authors {
			store.save(community, *author, &corpus.model)?;
			store.save_raw_messages(community, *author, &corpus.messages)?;
		}
		log::info!(
			"Saved models of {} authors for community {} in {}",
			self.authors.len(),
			community,
			store.community_dir(community).display()
		);
		Ok(())
	}
}

/// Reads a community's history through a [`MessageSource`] and builds models.
///
/// # Behavior
/// - Channels that are not text-capable are skipped before any fetch
/// - Each channel is paged backwards until an empty page
/// - Access denied ends a channel quietly, other failures end it with an error log
/// - Cancellation is checked after every page
///
/// With `parallelism > 1`, channels are split into contiguous chunks read by
/// scoped threads, each owning a partial [`CorpusBuild`]. Partials are merged
/// in chunk order, so the result is the same as a sequential pass.
pub struct CorpusBuilder<'a> {
	source: &'a dyn MessageSource,
	options: BuildOptions,
	cancel: CancelFlag,
}

impl<'a> CorpusBuilder<'a> {
	pub fn new(source: &'a dyn MessageSource, options: BuildOptions) -> Self {
		Self { source, options, cancel: CancelFlag::new() }
	}

	/// Uses an externally owned cancellation flag.
	pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
		self.cancel = cancel;
		self
	}

	pub fn build_from_history(&self, community: CommunityId) -> Result<CorpusBuild, BuildError> {
		let channels: Vec<Channel> = self
			.source
			.channels(community)?
			.into_iter()
			.filter(|channel| {
				if !channel.text_capable {
					log::debug!("Skipping channel {}: not a text channel", channel.id);
				}
				channel.text_capable
			})
			.collect();

		log::info!("Reading {} channels of community {}", channels.len(), community);

		let workers = self.options.parallelism.max(1);
		if workers == 1 || channels.len() <= 1 {
			return self.read_channels(&channels);
		}

		let chunk_size = channels.len().div_ceil(workers);
		let (tx, rx) = mpsc::channel();
		thread::scope(|scope| {
			for (index, chunk) in channels.chunks(chunk_size).enumerate() {
				let tx = tx.clone();
				scope.spawn(move || {
					// The receiver outlives the scope
					tx.send((index, self.read_channels(chunk))).ok();
				});
			}
		});
		drop(tx);

		let mut partials: Vec<(usize, Result<CorpusBuild, BuildError>)> = rx.iter().collect();
		partials.sort_by_key(|(index, _)| *index);

		let mut build = CorpusBuild::new();
		for (_, partial) in partials {
			build.merge(partial?).map_err(BuildError::Merge)?;
		}
		Ok(build)
	}

	fn read_channels(&self, channels: &[Channel]) -> Result<CorpusBuild, BuildError> {
		let mut build = CorpusBuild::new();
		for channel in channels {
			self.read_channel(channel.id, &mut build)?;
		}
		Ok(build)
	}

	fn read_channel(&self, channel: ChannelId, build: &mut CorpusBuild) -> Result<(), BuildError> {
		let mut before: Option<MessageId> = None;
		let mut pages = 0usize;

		loop {
			if self.cancel.is_cancelled() {
				log::info!("Corpus pass cancelled while reading channel {channel}");
				return Err(BuildError::Cancelled);
			}

			match self.source.fetch_page(channel, before, self.options.page_size) {
				PageResult::Page(messages) => {
					let Some(oldest) = messages.last() else {
						break;
					};
					before = Some(oldest.id);
					pages += 1;
					for message in &messages {
						build.add_message(message, &self.options.redaction_marker);
					}
				}
				PageResult::AccessDenied => {
					log::debug!("No access to channel {channel}");
					break;
				}
				PageResult::Failed(error) => {
					log::error!("Failed to read channel {channel}: {error}");
					break;
				}
			}
		}

		log::debug!("Read {pages} pages from channel {channel}");
		Ok(())
	}
}
