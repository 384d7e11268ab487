// Message history read from the chat platform REST API.

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use serde::Deserialize;

use mimic_core::error::HistoryError;
use mimic_core::history::{Channel, HistoryMessage, MessageSource, PageResult};
use mimic_core::ids::{AuthorId, ChannelId, CommunityId, MessageId};

/// Channel type of a plain text channel.
const TEXT_CHANNEL: u8 = 0;

/// Retries of one request after a rate limit or a transient server error.
const MAX_RETRIES: u32 = 5;
/// Wait used when the server does not say how long to back off.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct RestChannel {
	id: String,
	#[serde(rename = "type")]
	kind: u8,
}

#[derive(Deserialize)]
struct RestUser {
	id: String,
	#[serde(default)]
	bot: bool,
}

#[derive(Deserialize)]
struct RestMessage {
	id: String,
	#[serde(default)]
	content: String,
	author: RestUser,
}

/// Body of a 429 answer.
#[derive(Deserialize)]
struct RateLimited {
	retry_after: f64,
}

/// What to do after a non-success status.
#[derive(Debug, PartialEq)]
enum Outcome {
	Denied,
	Retry(Duration),
	Fail(String),
}

/// Why a request gave up.
enum Refused {
	Denied,
	Failed(String),
}

fn classify(status: StatusCode, retry_after: Option<&str>, body: &str) -> Outcome {
	match status {
		StatusCode::FORBIDDEN => Outcome::Denied,
		StatusCode::TOO_MANY_REQUESTS => Outcome::Retry(retry_delay(retry_after, body)),
		StatusCode::INTERNAL_SERVER_ERROR
		| StatusCode::BAD_GATEWAY
		| StatusCode::SERVICE_UNAVAILABLE
		| StatusCode::GATEWAY_TIMEOUT => Outcome::Retry(retry_delay(retry_after, "")),
		status => Outcome::Fail(format!("HTTP {status}")),
	}
}

/// Delay from the `Retry-After` header, else from the `retry_after` field
/// of the body, in seconds. Capped at [`MAX_RETRY_DELAY`].
fn retry_delay(header: Option<&str>, body: &str) -> Duration {
	header
		.and_then(|value| value.trim().parse::<f64>().ok())
		.or_else(|| serde_json::from_str::<RateLimited>(body).ok().map(|limited| limited.retry_after))
		.filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
		.map_or(DEFAULT_RETRY_DELAY, |seconds| {
			Duration::from_secs_f64(seconds.min(MAX_RETRY_DELAY.as_secs_f64()))
		})
}

fn to_channel(channel: RestChannel) -> Result<Channel, String> {
	let id = channel.id.parse::<ChannelId>().map_err(|e| format!("bad channel id {:?}: {e}", channel.id))?;
	Ok(Channel { id, text_capable: channel.kind == TEXT_CHANNEL })
}

fn to_history_message(message: RestMessage) -> Result<HistoryMessage, String> {
	let id = message.id.parse::<MessageId>().map_err(|e| format!("bad message id {:?}: {e}", message.id))?;
	let author = message
		.author
		.id
		.parse::<AuthorId>()
		.map_err(|e| format!("bad author id {:?}: {e}", message.author.id))?;
	Ok(HistoryMessage { id, author, content: message.content, automated: message.author.bot })
}

/// Blocking REST client paging through channel history.
///
/// Must not be created or used from inside an async runtime: rebuilds run
/// it on their own thread.
pub struct RestHistorySource {
	client: Client,
	api_base: String,
	token: String,
}

impl RestHistorySource {
	/// Creates a source with a per-request timeout.
	pub fn new(api_base: &str, token: &str, timeout: Duration) -> reqwest::Result<Self> {
		let client = Client::builder().timeout(timeout).build()?;
		Ok(Self {
			client,
			api_base: api_base.trim_end_matches('/').to_owned(),
			token: token.to_owned(),
		})
	}

	/// Sends a GET, waiting and retrying on rate limits and transient
	/// server errors. Returns only successful responses.
	fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response, Refused> {
		let mut retries = 0;
		loop {
			let response = self
				.client
				.get(url)
				.header(AUTHORIZATION, format!("Bot {}", self.token))
				.query(query)
				.send()
				.map_err(|e| Refused::Failed(e.to_string()))?;

			let status = response.status();
			if status.is_success() {
				return Ok(response);
			}

			let retry_after = response
				.headers()
				.get(RETRY_AFTER)
				.and_then(|value| value.to_str().ok())
				.map(str::to_owned);
			let body = response.text().unwrap_or_default();

			match classify(status, retry_after.as_deref(), &body) {
				Outcome::Denied => return Err(Refused::Denied),
				Outcome::Retry(delay) if retries < MAX_RETRIES => {
					retries += 1;
					log::warn!(
						"{url} answered {status}, retry {retries}/{MAX_RETRIES} in {:.1}s",
						delay.as_secs_f64()
					);
					thread::sleep(delay);
				}
				Outcome::Retry(_) => {
					return Err(Refused::Failed(format!("HTTP {status} after {MAX_RETRIES} retries")));
				}
				Outcome::Fail(reason) => return Err(Refused::Failed(reason)),
			}
		}
	}
}

impl MessageSource for RestHistorySource {
	fn channels(&self, community: CommunityId) -> Result<Vec<Channel>, HistoryError> {
		let url = format!("{}/guilds/{community}/channels", self.api_base);
		let channels: Vec<RestChannel> = match self.get(&url, &[]) {
			Ok(response) => response.json().map_err(|e| HistoryError::Other(e.to_string()))?,
			Err(Refused::Denied) => return Err(HistoryError::Other(format!("access denied to community {community}"))),
			Err(Refused::Failed(reason)) => return Err(HistoryError::Other(reason)),
		};

		channels
			.into_iter()
			.map(to_channel)
			.collect::<Result<_, _>>()
			.map_err(HistoryError::Other)
	}

	fn fetch_page(&self, channel: ChannelId, before: Option<MessageId>, limit: usize) -> PageResult {
		let mut query = vec![("limit", limit.to_string())];
		if let Some(before) = before {
			query.push(("before", before.to_string()));
		}

		let url = format!("{}/channels/{channel}/messages", self.api_base);
		let response = match self.get(&url, &query) {
			Ok(response) => response,
			Err(Refused::Denied) => return PageResult::AccessDenied,
			Err(Refused::Failed(reason)) => return PageResult::Failed(reason),
		};

		let messages: Vec<RestMessage> = match response.json() {
			Ok(messages) => messages,
			Err(e) => return PageResult::Failed(e.to_string()),
		};

		match messages.into_iter().map(to_history_message).collect::<Result<Vec<_>, _>>() {
			Ok(page) => PageResult::Page(page),
			Err(e) => PageResult::Failed(e),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::{BufRead, BufReader, Write};
	use std::net::TcpListener;

	/// Answers one connection per canned response, in order.
	fn serve(responses: Vec<String>) -> (RestHistorySource, thread::JoinHandle<()>) {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let api_base = format!("http://{}", listener.local_addr().unwrap());
		let handle = thread::spawn(move || {
			for response in responses {
				let (mut stream, _) = listener.accept().unwrap();
				let mut reader = BufReader::new(stream.try_clone().unwrap());
				let mut line = String::new();
				while reader.read_line(&mut line).unwrap() > 2 {
					line.clear();
				}
				stream.write_all(response.as_bytes()).unwrap();
			}
		});
		let source = RestHistorySource {
			client: Client::builder().no_proxy().build().unwrap(),
			api_base,
			token: "token".to_owned(),
		};
		(source, handle)
	}

	fn answer(status: &str, headers: &str, body: &str) -> String {
		format!(
			"HTTP/1.1 {status}\r\n{headers}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
			body.len()
		)
	}

	#[test]
	fn status_mapping() {
		assert_eq!(classify(StatusCode::FORBIDDEN, None, ""), Outcome::Denied);
		assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS, Some("2"), ""), Outcome::Retry(Duration::from_secs(2)));
		assert_eq!(
			classify(StatusCode::TOO_MANY_REQUESTS, None, r#"{"message": "slow down", "retry_after": 0.5}"#),
			Outcome::Retry(Duration::from_millis(500))
		);
		assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS, None, ""), Outcome::Retry(DEFAULT_RETRY_DELAY));
		assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS, Some("99999"), ""), Outcome::Retry(MAX_RETRY_DELAY));
		assert_eq!(classify(StatusCode::SERVICE_UNAVAILABLE, None, ""), Outcome::Retry(DEFAULT_RETRY_DELAY));
		assert_eq!(classify(StatusCode::NOT_FOUND, None, ""), Outcome::Fail("HTTP 404 Not Found".to_owned()));
	}

	#[test]
	fn rate_limited_page_is_retried() {
		let page = r#"[{"id": "9", "content": "still here", "author": {"id": "4"}}]"#;
		let (source, server) = serve(vec![
			answer("429 Too Many Requests", "Retry-After: 0\r\n", ""),
			answer("429 Too Many Requests", "", r#"{"retry_after": 0}"#),
			answer("503 Service Unavailable", "Retry-After: 0\r\n", ""),
			answer("200 OK", "", page),
		]);

		match source.fetch_page(ChannelId(1), Some(MessageId(10)), 50) {
			PageResult::Page(messages) => {
				assert_eq!(messages.len(), 1);
				assert_eq!(messages[0].author, AuthorId(4));
				assert_eq!(messages[0].content, "still here");
			}
			_ => panic!("expected a page after retrying"),
		}
		server.join().unwrap();
	}

	#[test]
	fn forbidden_page_is_access_denied() {
		let (source, server) = serve(vec![answer("403 Forbidden", "", "{}")]);
		assert!(matches!(source.fetch_page(ChannelId(1), None, 100), PageResult::AccessDenied));
		server.join().unwrap();
	}

	#[test]
	fn endless_rate_limit_gives_up() {
		let responses = (0..=MAX_RETRIES).map(|_| answer("429 Too Many Requests", "Retry-After: 0\r\n", "")).collect();
		let (source, server) = serve(responses);
		match source.fetch_page(ChannelId(1), None, 100) {
			PageResult::Failed(reason) => assert!(reason.contains("429"), "{reason}"),
			_ => panic!("expected a failed page"),
		}
		server.join().unwrap();
	}

	#[test]
	fn converts_platform_payloads() {
		let json = r#"[
			{"id": "1111", "content": "hello", "author": {"id": "22", "username": "someone"}},
			{"id": "1110", "author": {"id": "23", "bot": true}}
		]"#;
		let messages: Vec<RestMessage> = serde_json::from_str(json).unwrap();
		let page: Vec<HistoryMessage> = messages.into_iter().map(to_history_message).collect::<Result<_, _>>().unwrap();

		assert_eq!(page[0].id, MessageId(1111));
		assert_eq!(page[0].author, AuthorId(22));
		assert_eq!(page[0].content, "hello");
		assert!(!page[0].automated);
		assert!(page[1].automated);
		assert!(page[1].content.is_empty());
	}

	#[test]
	fn text_channels_only() {
		let channels: Vec<RestChannel> =
			serde_json::from_str(r#"[{"id": "5", "type": 0, "name": "general"}, {"id": "6", "type": 2}]"#).unwrap();
		let channels: Vec<Channel> = channels.into_iter().map(to_channel).collect::<Result<_, _>>().unwrap();
		assert!(channels[0].text_capable);
		assert!(!channels[1].text_capable);
	}

	#[test]
	fn bad_ids_are_rejected() {
		let message = RestMessage {
			id: "abc".to_owned(),
			content: String::new(),
			author: RestUser { id: "1".to_owned(), bot: false },
		};
		assert!(to_history_message(message).is_err());
	}
}
