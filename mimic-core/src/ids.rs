use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! snowflake {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
		#[serde(transparent)]
		pub struct $name(pub u64);

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl FromStr for $name {
			type Err = ParseIntError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				s.parse().map(Self)
			}
		}

		impl From<u64> for $name {
			fn from(value: u64) -> Self {
				Self(value)
			}
		}
	};
}

snowflake!(
	/// A chat community (guild/server). Models are segmented per community.
	CommunityId
);
snowflake!(
	/// The author of a message, and the owner of a per-author model.
	AuthorId
);
snowflake!(ChannelId);
snowflake!(
	/// Message identifier, used as the pagination cursor.
	MessageId
);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_and_displays_decimal() {
		let id: AuthorId = "525099478173220869".parse().unwrap();
		assert_eq!(id, AuthorId(525099478173220869));
		assert_eq!(id.to_string(), "525099478173220869");
		assert!("global".parse::<AuthorId>().is_err());
	}
}
