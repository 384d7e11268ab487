// Server configuration: an optional TOML file, overridden by CLI flags.

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use mimic_core::corpus::{BuildOptions, DEFAULT_PAGE_SIZE, DEFAULT_REDACTION_MARKER};
use mimic_core::ids::AuthorId;
use mimic_core::responder::{DEFAULT_TRIGGER_PHRASE, ResponderConfig};

#[derive(Debug, clap::Parser)]
pub struct Args {
	/// TOML configuration file
	#[arg(long, short)]
	pub config: Option<PathBuf>,

	#[arg(long)]
	pub bind: Option<String>,

	#[arg(long)]
	pub port: Option<u16>,

	/// Directory of the Markov model store
	#[arg(long)]
	pub markov_dir: Option<PathBuf>,

	/// Directory of the alternate generator (models/ and messages/)
	#[arg(long)]
	pub alternate_dir: Option<PathBuf>,

	/// Read history from JSON dumps in this directory instead of the configured source
	#[arg(long)]
	pub history_dir: Option<PathBuf>,

	/// Bot owner, the only author allowed to force messages and rebuilds
	#[arg(long)]
	pub owner: Option<u64>,
}

/// Where corpus passes read message history from.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HistoryConfig {
	/// `<community>.json` dumps in a directory.
	File { dir: PathBuf },
	/// The chat platform REST API. The token falls back to `BOT_TOKEN`.
	Rest {
		api_base: String,
		#[serde(default)]
		token: Option<String>,
		#[serde(default = "default_timeout_secs")]
		timeout_secs: u64,
	},
}

fn default_timeout_secs() -> u64 {
	30
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
	pub bind: String,
	pub port: u16,
	pub markov_dir: PathBuf,
	pub alternate_dir: PathBuf,
	pub owner: Option<AuthorId>,
	pub trigger_phrase: String,
	pub base_chance_percent: f64,
	pub cooldown_minutes: f64,
	pub markov_share_percent: f64,
	pub redaction_marker: String,
	pub page_size: usize,
	/// Channels read at once during a rebuild. Defaults to the CPU count.
	pub parallelism: Option<usize>,
	pub history: HistoryConfig,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			bind: "127.0.0.1".to_owned(),
			port: 5000,
			markov_dir: PathBuf::from("Resources/Markov"),
			alternate_dir: PathBuf::from("Resources/GPT2"),
			owner: None,
			trigger_phrase: DEFAULT_TRIGGER_PHRASE.to_owned(),
			base_chance_percent: 1.0,
			cooldown_minutes: 10.0,
			markov_share_percent: 33.0,
			redaction_marker: DEFAULT_REDACTION_MARKER.to_owned(),
			page_size: DEFAULT_PAGE_SIZE,
			parallelism: None,
			history: HistoryConfig::File { dir: PathBuf::from("Resources/History") },
		}
	}
}

impl Config {
	/// Reads the TOML file given on the command line (if any), then applies CLI overrides.
	pub fn load(args: &Args) -> Result<Self, Box<dyn Error>> {
		let mut config = match &args.config {
			Some(path) => {
				let text = std::fs::read_to_string(path)
					.map_err(|e| format!("cannot read config `{}`: {e}", path.display()))?;
				Self::from_toml(&text)?
			}
			None => Self::default(),
		};
		config.apply(args);
		Ok(config)
	}

	pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(text)
	}

	fn apply(&mut self, args: &Args) {
		if let Some(bind) = &args.bind {
			self.bind = bind.clone();
		}
		if let Some(port) = args.port {
			self.port = port;
		}
		if let Some(dir) = &args.markov_dir {
			self.markov_dir = dir.clone();
		}
		if let Some(dir) = &args.alternate_dir {
			self.alternate_dir = dir.clone();
		}
		if let Some(dir) = &args.history_dir {
			self.history = HistoryConfig::File { dir: dir.clone() };
		}
		if let Some(owner) = args.owner {
			self.owner = Some(AuthorId(owner));
		}
	}

	pub fn responder_config(&self) -> ResponderConfig {
		ResponderConfig {
			owner: self.owner,
			trigger_phrase: self.trigger_phrase.clone(),
			base_chance_percent: self.base_chance_percent,
			cooldown: Duration::from_secs_f64(self.cooldown_minutes.max(0.0) * 60.0),
			markov_share_percent: self.markov_share_percent,
		}
	}

	pub fn build_options(&self) -> BuildOptions {
		let mut options = BuildOptions {
			redaction_marker: self.redaction_marker.clone(),
			page_size: self.page_size.max(1),
			..BuildOptions::default()
		};
		if let Some(parallelism) = self.parallelism {
			options.parallelism = parallelism.max(1);
		}
		options
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;

	#[test]
	fn empty_file_gives_defaults() {
		let config = Config::from_toml("").unwrap();
		assert_eq!(config.port, 5000);
		assert_eq!(config.redaction_marker, "||");
		assert_eq!(config.history, HistoryConfig::File { dir: PathBuf::from("Resources/History") });
	}

	#[test]
	fn file_values_and_rest_history() {
		let config = Config::from_toml(
			r#"
			port = 8080
			owner = 42
			cooldown_minutes = 5.0
			parallelism = 2

			[history]
			kind = "rest"
			api_base = "https://chat.example/api/v10"
			"#,
		)
		.unwrap();

		assert_eq!(config.port, 8080);
		assert_eq!(config.owner, Some(AuthorId(42)));
		assert_eq!(config.responder_config().cooldown, Duration::from_secs(300));
		assert_eq!(config.build_options().parallelism, 2);
		assert_eq!(
			config.history,
			HistoryConfig::Rest {
				api_base: "https://chat.example/api/v10".to_owned(),
				token: None,
				timeout_secs: 30,
			}
		);
	}

	#[test]
	fn cli_overrides_file() {
		let args = Args::parse_from(["mimic-server", "--port", "9000", "--owner", "7", "--history-dir", "dumps"]);
		let mut config = Config::from_toml("port = 8080").unwrap();
		config.apply(&args);

		assert_eq!(config.port, 9000);
		assert_eq!(config.owner, Some(AuthorId(7)));
		assert_eq!(config.history, HistoryConfig::File { dir: PathBuf::from("dumps") });
	}
}
