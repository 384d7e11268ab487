//! Message history sources read by the corpus builder.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::HistoryError;
use crate::ids::{AuthorId, ChannelId, CommunityId, MessageId};
use crate::io::{get_filename, list_files};

/// One historical message as the builder sees it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HistoryMessage {
	pub id: MessageId,
	pub author: AuthorId,
	pub content: String,
	/// Sent by a bot or another automated account.
	#[serde(default)]
	pub automated: bool,
}

/// A channel of a community.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Channel {
	pub id: ChannelId,
	/// Only text-capable channels are paginated.
	pub text_capable: bool,
}

/// Outcome of a single page fetch.
#[derive(Debug)]
pub enum PageResult {
	/// Messages older than the cursor, newest first. Empty once history is exhausted.
	Page(Vec<HistoryMessage>),
	/// The reader may not see this channel. Expected, not an error.
	AccessDenied,
	/// Any other failure. The builder gives up on the channel.
	Failed(String),
}

/// A paginated, reverse-chronological source of message history.
///
/// Implementations own their timeout and retry policy. `Sync` is required
/// because the builder may page through several channels at once.
pub trait MessageSource: Sync {
	/// Lists the channels of a community.
	fn channels(&self, community: CommunityId) -> Result<Vec<Channel>, HistoryError>;

	/// Fetches up to `limit` messages older than `before` (or the newest ones).
	fn fetch_page(&self, channel: ChannelId, before: Option<MessageId>, limit: usize) -> PageResult;
}

/// Exported history of one community.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct HistoryDump {
	pub channels: Vec<ChannelDump>,
}

/// Exported history of one channel, newest message first.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChannelDump {
	pub id: ChannelId,
	#[serde(default = "default_text")]
	pub text: bool,
	/// Simulates a channel the reader has no access to.
	#[serde(default)]
	pub denied: bool,
	#[serde(default)]
	pub messages: Vec<HistoryMessage>,
}

fn default_text() -> bool {
	true
}

/// History read from JSON dumps, one `<community>.json` file per community.
#[derive(Debug, Default)]
pub struct FileHistorySource {
	communities: HashMap<CommunityId, Vec<Channel>>,
	channels: HashMap<ChannelId, ChannelDump>,
}

impl FileHistorySource {
	/// Loads every `<community id>.json` dump found in `dir`.
	///
	/// Files whose name is not a community id are skipped.
	pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, HistoryError> {
		let dir = dir.as_ref();
		let mut source = Self::default();

		for file in list_files(dir, "json")? {
			let Ok(community) = get_filename(&file)?.parse::<CommunityId>() else {
				log::debug!("Skipping {file}: not a community dump");
				continue;
			};
			let dump: HistoryDump = serde_json::from_slice(&fs::read(dir.join(&file))?)?;
			source.insert(community, dump);
		}

		Ok(source)
	}

	/// Builds a source holding a single community.
	pub fn from_dump(community: CommunityId, dump: HistoryDump) -> Self {
		let mut source = Self::default();
		source.insert(community, dump);
		source
	}

	/// Adds (or replaces) the history of a community.
	pub fn insert(&mut self, community: CommunityId, dump: HistoryDump) {
		let listed = dump
			.channels
			.iter()
			.map(|channel| Channel { id: channel.id, text_capable: channel.text })
			.collect();
		self.communities.insert(community, listed);
		for channel in dump.channels {
			self.channels.insert(channel.id, channel);
		}
	}
}

impl MessageSource for FileHistorySource {
	fn channels(&self, community: CommunityId) -> Result<Vec<Channel>, HistoryError> {
		self.communities
			.get(&community)
			.cloned()
			.ok_or_else(|| HistoryError::UnknownCommunity(community.to_string()))
	}

	fn fetch_page(&self, channel: ChannelId, before: Option<MessageId>, limit: usize) -> PageResult {
		let Some(dump) = self.channels.get(&channel) else {
			return PageResult::Failed(format!("unknown channel {channel}"));
		};
		if dump.denied {
			return PageResult::AccessDenied;
		}

		let start = match before {
			None => 0,
			Some(cursor) => match dump.messages.iter().position(|message| message.id == cursor) {
				Some(index) => index + 1,
				None => return PageResult::Failed(format!("unknown message {cursor} in channel {channel}")),
			},
		};

		PageResult::Page(dump.messages.iter().skip(start).take(limit).cloned().collect())
	}
}
