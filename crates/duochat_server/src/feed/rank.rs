#![forbid(unsafe_code)]

use duochat_domain::Rank;

/// Binds the first three distinct chatters to the three rank slots.
///
/// Slots are indexed by rank ordinal and are never freed once bound.
#[derive(Debug, Default)]
pub struct RankAssigner {
	slots: [Option<String>; Rank::COUNT],
}

impl RankAssigner {
	pub fn new() -> Self {
		Self::default()
	}

	/// Rank already held by `username`, or the first free slot, or `None` when all are taken.
	pub fn assign_or_lookup(&mut self, username: &str) -> Option<Rank> {
		if let Some(rank) = self.lookup(username) {
			return Some(rank);
		}

		let rank = Rank::ALL.into_iter().find(|r| self.slots[r.index()].is_none())?;
		self.slots[rank.index()] = Some(username.to_string());
		Some(rank)
	}

	pub fn lookup(&self, username: &str) -> Option<Rank> {
		Rank::ALL
			.into_iter()
			.find(|r| self.slots[r.index()].as_deref() == Some(username))
	}

	/// Number of bound slots.
	pub fn bound(&self) -> usize {
		self.slots.iter().filter(|s| s.is_some()).count()
	}
}
