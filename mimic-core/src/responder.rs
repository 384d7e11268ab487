//! Runtime responder: decides when the bot chimes into a conversation
//! and which generator speaks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;

use crate::alternate::AlternateGenerator;
use crate::error::{GenerationError, ResponderError};
use crate::ids::{AuthorId, ChannelId, CommunityId};
use crate::model::generator::MessageGenerator;

/// Phrase the owner can post to force a generated message.
pub const DEFAULT_TRIGGER_PHRASE: &str = "test test among us 123";

/// Tuning of the responder.
#[derive(Clone, Debug)]
pub struct ResponderConfig {
	/// Only this author may force a message. `None`: nobody can.
	pub owner: Option<AuthorId>,
	/// Compared case-insensitively with the whole message.
	pub trigger_phrase: String,
	/// Chance, in percent, to answer any message in a quiet channel.
	pub base_chance_percent: f64,
	/// After answering, the chance ramps back up linearly over this period.
	pub cooldown: Duration,
	/// Chance, in percent, to ask the Markov generator first.
	pub markov_share_percent: f64,
}

impl Default for ResponderConfig {
	fn default() -> Self {
		Self {
			owner: None,
			trigger_phrase: DEFAULT_TRIGGER_PHRASE.to_owned(),
			base_chance_percent: 1.0,
			cooldown: Duration::from_secs(10 * 60),
			markov_share_percent: 33.0,
		}
	}
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
	Markov,
	Alternate,
}

impl fmt::Display for GeneratorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			GeneratorKind::Markov => write!(f, "Markov"),
			GeneratorKind::Alternate => write!(f, "GPT-2"),
		}
	}
}

/// A message seen in a channel.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
	pub community: CommunityId,
	pub channel: ChannelId,
	pub author: AuthorId,
	pub content: String,
}

/// A generated message to post, on behalf of `author`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Reply {
	pub generator: GeneratorKind,
	pub author: AuthorId,
	pub message: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
	Ignored,
	Reply(Reply),
}

/// Holds the per-channel "last time we talked" state. Owned by whoever
/// receives messages; no process-wide state is involved.
pub struct Responder {
	config: ResponderConfig,
	markov: MessageGenerator,
	alternate: Arc<dyn AlternateGenerator>,
	last_talked: HashMap<ChannelId, Instant>,
}

/// True when `author` may force a generated message.
pub fn authorize_force_trigger(owner: Option<AuthorId>, author: AuthorId) -> bool {
	owner == Some(author)
}

fn percent<R: Rng + ?Sized>(rng: &mut R, percent: f64) -> bool {
	if percent <= 0.0 {
		false
	} else if percent >= 100.0 {
		true
	} else {
		rng.random::<f64>() * 100.0 <= percent
	}
}

impl Responder {
	pub fn new(config: ResponderConfig, markov: MessageGenerator, alternate: Arc<dyn AlternateGenerator>) -> Self {
		Self { config, markov, alternate, last_talked: HashMap::new() }
	}

	pub fn config(&self) -> &ResponderConfig {
		&self.config
	}

	pub fn last_talked(&self, channel: ChannelId) -> Option<Instant> {
		self.last_talked.get(&channel).copied()
	}

	/// Current chance, in percent, to answer a message in `channel`.
	///
	/// Right after the bot talked the chance is 0, then it grows linearly back
	/// to `base_chance_percent` over the cooldown.
	pub fn chance_percent(&self, channel: ChannelId, now: Instant) -> f64 {
		let cooldown = self.config.cooldown.as_secs_f64();
		let reduction = match self.last_talked.get(&channel) {
			Some(last) if cooldown > 0.0 => {
				let elapsed = now.saturating_duration_since(*last).as_secs_f64();
				if elapsed < cooldown { (cooldown - elapsed) / cooldown } else { 0.0 }
			}
			_ => 0.0,
		};
		self.config.base_chance_percent * (1.0 - reduction)
	}

	fn is_trigger(&self, content: &str) -> bool {
		content.to_lowercase() == self.config.trigger_phrase.to_lowercase()
	}

	/// Decides whether to answer `event`, and with what.
	///
	/// # Errors
	/// - [`ResponderError::Unauthorized`] when someone other than the owner
	///   posts the trigger phrase (and the random draw did not fire anyway)
	/// - generation failures (corrupt model files, unreadable line files)
	pub fn respond<R: Rng + ?Sized>(
		&mut self,
		event: &IncomingMessage,
		now: Instant,
		rng: &mut R,
	) -> Result<Decision, ResponderError> {
		if event.content.trim().is_empty() {
			return Ok(Decision::Ignored);
		}

		let chance = self.chance_percent(event.channel, now);
		if !percent(rng, chance) {
			if !self.is_trigger(&event.content) {
				return Ok(Decision::Ignored);
			}
			if !authorize_force_trigger(self.config.owner, event.author) {
				log::warn!("{} tried to force a message in channel {}", event.author, event.channel);
				return Err(ResponderError::Unauthorized);
			}
		}

		let Some(reply) = self.generate(event.community, rng)? else {
			return Ok(Decision::Ignored);
		};

		self.last_talked.insert(event.channel, now);
		log::info!(
			"[{}] #{} {} ({}): {}",
			event.community,
			event.channel,
			reply.author,
			reply.generator,
			reply.message
		);
		Ok(Decision::Reply(reply))
	}

	/// Asks one generator, then the other if the first had nothing.
	///
	/// The Markov generator goes first with `markov_share_percent` chance.
	/// Blank messages count as nothing.
	pub fn generate<R: Rng + ?Sized>(
		&self,
		community: CommunityId,
		rng: &mut R,
	) -> Result<Option<Reply>, GenerationError> {
		let order = if percent(rng, self.config.markov_share_percent) {
			[GeneratorKind::Markov, GeneratorKind::Alternate]
		} else {
			[GeneratorKind::Alternate, GeneratorKind::Markov]
		};

		for generator in order {
			let produced = match generator {
				GeneratorKind::Markov => self.markov.message_for_community_with(community, rng)?,
				GeneratorKind::Alternate => self.alternate.message_for_community(community)?,
			};
			match produced {
				Some((author, message)) if !message.trim().is_empty() => {
					return Ok(Some(Reply { generator, author, message }));
				}
				_ => log::debug!("{generator} generator had nothing for community {community}"),
			}
		}

		Ok(None)
	}
}
