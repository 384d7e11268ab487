// End-to-end tests: history -> corpus pass -> store -> generation.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use mimic_core::alternate::NoAlternate;
use mimic_core::corpus::{BuildOptions, CancelFlag, CorpusBuilder};
use mimic_core::error::{BuildError, HistoryError};
use mimic_core::history::{
	Channel, ChannelDump, FileHistorySource, HistoryDump, HistoryMessage, MessageSource, PageResult,
};
use mimic_core::ids::{AuthorId, ChannelId, CommunityId, MessageId};
use mimic_core::model::generator::MessageGenerator;
use mimic_core::model::markov_model::{END_WORD, START_WORD};
use mimic_core::store::ModelStore;
use tempfile::TempDir;

const COMMUNITY: CommunityId = CommunityId(1000);

fn message(id: u64, author: u64, content: &str) -> HistoryMessage {
	HistoryMessage {
		id: MessageId(id),
		author: AuthorId(author),
		content: content.to_owned(),
		automated: false,
	}
}

fn channel(id: u64, messages: Vec<HistoryMessage>) -> ChannelDump {
	ChannelDump { id: ChannelId(id), text: true, denied: false, messages }
}

/// Newest message first, as the platform returns them.
fn sample_dump() -> HistoryDump {
	let mut bot = message(5, 99, "i am a bot");
	bot.automated = true;

	let mut voice = channel(2, vec![message(20, 10, "voice chat text")]);
	voice.text = false;

	let mut denied = channel(3, vec![message(30, 10, "hidden text")]);
	denied.denied = true;

	HistoryDump {
		channels: vec![
			channel(
				1,
				vec![
					message(6, 10, "good night all"),
					bot,
					message(4, 20, "spoiler ||ending||"),
					message(3, 20, "hello there"),
					message(2, 10, "good morning all"),
					message(1, 10, "   "),
				],
			),
			voice,
			denied,
		],
	}
}

fn options(page_size: usize, parallelism: usize) -> BuildOptions {
	BuildOptions { page_size, parallelism, ..BuildOptions::default() }
}

#[test]
fn builds_saves_and_generates() {
	let source = FileHistorySource::from_dump(COMMUNITY, sample_dump());
	let build = CorpusBuilder::new(&source, options(2, 1)).build_from_history(COMMUNITY).unwrap();

	assert_eq!(build.raw_messages(AuthorId(10)).unwrap(), ["good night all", "good morning all"]);
	assert_eq!(build.raw_messages(AuthorId(20)).unwrap(), ["hello there"]);
	assert!(build.raw_messages(AuthorId(99)).is_none());

	let author = build.author_model(AuthorId(10)).unwrap();
	assert_eq!(author.weight(START_WORD, "good"), 2);
	assert_eq!(author.weight("good", "night"), 1);
	assert_eq!(author.weight("good", "morning"), 1);
	assert_eq!(author.weight("all", END_WORD), 2);
	assert!(author.node("voice").is_none());
	assert!(author.node("hidden").is_none());
	assert_eq!(build.global.weight(START_WORD, "hello"), 1);
	assert_eq!(build.global.weight(START_WORD, "spoiler"), 0);

	let td = TempDir::new().unwrap();
	let store = ModelStore::new(td.path());
	build.save(&store, COMMUNITY).unwrap();
	let dir = store.community_dir(COMMUNITY);
	for file in ["global.json", "10.json", "20.json", "10_messages.json", "20_messages.json"] {
		assert!(dir.join(file).is_file(), "{file} missing");
	}

	let generator = MessageGenerator::new(store.clone(), Arc::new(NoAlternate));
	assert_eq!(
		generator.eligible_authors(COMMUNITY).unwrap(),
		HashSet::from([AuthorId(10), AuthorId(20)])
	);
	assert_eq!(generator.mimic(COMMUNITY, AuthorId(20)).unwrap().unwrap(), "hello there");

	let global = store.load_global(COMMUNITY).unwrap().unwrap();
	assert_eq!(global, build.global);
}

#[test]
fn parallel_pass_matches_sequential_pass() {
	let channels = (1..=6u64)
		.map(|c| {
			let messages = (1..=7u64)
				.rev()
				.map(|i| message(c * 100 + i, i % 3, &format!("channel {c} says {} then {}", i, i % 2)))
				.collect();
			channel(c, messages)
		})
		.collect();
	let source = FileHistorySource::from_dump(COMMUNITY, HistoryDump { channels });

	let sequential = CorpusBuilder::new(&source, options(3, 1)).build_from_history(COMMUNITY).unwrap();
	let parallel = CorpusBuilder::new(&source, options(3, 4)).build_from_history(COMMUNITY).unwrap();

	let (seq_global, seq_models, seq_messages) = sequential.into_parts();
	let (par_global, par_models, par_messages) = parallel.into_parts();
	assert_eq!(seq_global, par_global);
	assert_eq!(seq_models, par_models);
	assert_eq!(seq_messages, par_messages);
	assert_eq!(seq_messages[&AuthorId(1)].len(), 6 * 3);
}

/// Fails every page of one channel, delegates the rest.
struct FlakySource {
	inner: FileHistorySource,
	broken: ChannelId,
}

impl MessageSource for FlakySource {
	fn channels(&self, community: CommunityId) -> Result<Vec<Channel>, HistoryError> {
		self.inner.channels(community)
	}

	fn fetch_page(&self, channel: ChannelId, before: Option<MessageId>, limit: usize) -> PageResult {
		if channel == self.broken {
			return PageResult::Failed("connection reset".to_owned());
		}
		self.inner.fetch_page(channel, before, limit)
	}
}

#[test]
fn failing_channel_is_skipped() {
	let dump = HistoryDump {
		channels: vec![
			channel(1, vec![message(1, 5, "lost words")]),
			channel(2, vec![message(2, 5, "kept words")]),
		],
	};
	let source = FlakySource { inner: FileHistorySource::from_dump(COMMUNITY, dump), broken: ChannelId(1) };

	let build = CorpusBuilder::new(&source, options(10, 1)).build_from_history(COMMUNITY).unwrap();
	assert_eq!(build.raw_messages(AuthorId(5)).unwrap(), ["kept words"]);
}

/// Cancels the pass as soon as the first page has been served.
struct CancellingSource {
	inner: FileHistorySource,
	cancel: CancelFlag,
}

impl MessageSource for CancellingSource {
	fn channels(&self, community: CommunityId) -> Result<Vec<Channel>, HistoryError> {
		self.inner.channels(community)
	}

	fn fetch_page(&self, channel: ChannelId, before: Option<MessageId>, limit: usize) -> PageResult {
		let page = self.inner.fetch_page(channel, before, limit);
		self.cancel.cancel();
		page
	}
}

#[test]
fn cancellation_stops_between_pages() {
	let cancel = CancelFlag::new();
	let source = CancellingSource {
		inner: FileHistorySource::from_dump(COMMUNITY, sample_dump()),
		cancel: cancel.clone(),
	};

	let result = CorpusBuilder::new(&source, options(1, 1))
		.with_cancel(cancel)
		.build_from_history(COMMUNITY);
	assert!(matches!(result, Err(BuildError::Cancelled)));
}

#[test]
fn unknown_community_cannot_start() {
	let source = FileHistorySource::from_dump(COMMUNITY, sample_dump());
	let result = CorpusBuilder::new(&source, BuildOptions::default()).build_from_history(CommunityId(1));
	assert!(matches!(result, Err(BuildError::History(_))));
}

#[test]
fn dumps_load_from_directory() {
	let td = TempDir::new().unwrap();
	let dir = td.path();
	fs::write(dir.join(format!("{COMMUNITY}.json")), serde_json::to_vec(&sample_dump()).unwrap()).unwrap();
	fs::write(dir.join("notes.json"), "{}").unwrap();

	let source = FileHistorySource::from_dir(dir).unwrap();
	let channels = source.channels(COMMUNITY).unwrap();
	assert_eq!(channels.len(), 3);
	assert!(!channels[1].text_capable);
}
