// Bookkeeping of running corpus rebuilds, one per community at most.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use mimic_core::corpus::CancelFlag;
use mimic_core::ids::CommunityId;

#[derive(Debug, Default)]
pub struct Jobs {
	running: Mutex<HashMap<CommunityId, CancelFlag>>,
}

impl Jobs {
	/// Registers a rebuild. Returns its cancel flag, or `None` if one is already running.
	pub fn start(&self, community: CommunityId) -> Option<CancelFlag> {
		let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
		if running.contains_key(&community) {
			return None;
		}
		let cancel = CancelFlag::new();
		running.insert(community, cancel.clone());
		Some(cancel)
	}

	pub fn finish(&self, community: CommunityId) {
		self.running.lock().unwrap_or_else(PoisonError::into_inner).remove(&community);
	}

	/// Asks a running rebuild to stop. Returns `false` when none is running.
	pub fn cancel(&self, community: CommunityId) -> bool {
		match self.running.lock().unwrap_or_else(PoisonError::into_inner).get(&community) {
			Some(cancel) => {
				cancel.cancel();
				true
			}
			None => false,
		}
	}

	pub fn is_running(&self, community: CommunityId) -> bool {
		self.running.lock().unwrap_or_else(PoisonError::into_inner).contains_key(&community)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn one_job_per_community() {
		let jobs = Jobs::default();
		let flag = jobs.start(CommunityId(1)).unwrap();
		assert!(jobs.start(CommunityId(1)).is_none());
		assert!(jobs.start(CommunityId(2)).is_some());

		assert!(jobs.cancel(CommunityId(1)));
		assert!(flag.is_cancelled());

		jobs.finish(CommunityId(1));
		assert!(!jobs.is_running(CommunityId(1)));
		assert!(!jobs.cancel(CommunityId(1)));
		assert!(jobs.start(CommunityId(1)).is_some());
	}
}
