#![forbid(unsafe_code)]

use duochat_domain::{BadgeSet, BadgeVersion, CheermoteSet, CheermoteTier};

/// Read-mostly badge and cheermote tables filled once a source has authenticated.
#[derive(Debug, Default)]
pub struct EnrichmentCache {
	badges: Vec<BadgeSet>,
	cheermotes: Vec<CheermoteSet>,
}

impl EnrichmentCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the badge table with channel sets followed by global sets.
	///
	/// Duplicated set ids are kept; lookups take the first match, so channel sets shadow global ones.
	pub fn load_badges(&mut self, channel: Vec<BadgeSet>, global: Vec<BadgeSet>) {
		let mut badges = channel;
		badges.extend(global);
		self.badges = badges;
	}

	pub fn lookup_badge(&self, set_id: &str, id: &str) -> Option<BadgeVersion> {
		self.badges
			.iter()
			.find(|set| set.set_id == set_id)
			.and_then(|set| set.version(id))
			.cloned()
	}

	pub fn load_cheermote_tiers(&mut self, sets: Vec<CheermoteSet>) {
		self.cheermotes = sets;
	}

	/// Highest tier whose `min_bits` does not exceed `bits`.
	pub fn resolve_cheermote(&self, prefix: &str, bits: u64) -> Option<CheermoteTier> {
		self.cheermotes
			.iter()
			.find(|set| set.prefix.eq_ignore_ascii_case(prefix))?
			.tiers
			.iter()
			.filter(|tier| tier.min_bits <= bits)
			.max_by_key(|tier| tier.min_bits)
			.cloned()
	}

	pub fn badge_set_count(&self) -> usize {
		self.badges.len()
	}

	pub fn cheermote_set_count(&self) -> usize {
		self.cheermotes.len()
	}
}
