#![forbid(unsafe_code)]

use duochat_domain::{BadgeSet, BadgeVersion, CheermoteSet, CheermoteTier};

use crate::feed::enrichment::EnrichmentCache;

fn tier(min_bits: u64) -> CheermoteTier {
	CheermoteTier {
		id: min_bits.to_string(),
		min_bits,
		color: "#979797".to_string(),
		can_cheer: true,
		..CheermoteTier::default()
	}
}

fn cheer_set() -> CheermoteSet {
	CheermoteSet {
		prefix: "Cheer".to_string(),
		tiers: vec![tier(1), tier(100), tier(1000)],
	}
}

fn badge_set(set_id: &str, versions: &[(&str, &str)]) -> BadgeSet {
	BadgeSet {
		set_id: set_id.to_string(),
		versions: versions
			.iter()
			.map(|(id, title)| BadgeVersion {
				id: id.to_string(),
				title: title.to_string(),
				..BadgeVersion::default()
			})
			.collect(),
	}
}

#[test]
fn cheermote_picks_highest_qualifying_tier() {
	let mut cache = EnrichmentCache::new();
	cache.load_cheermote_tiers(vec![cheer_set()]);

	assert_eq!(cache.resolve_cheermote("Cheer", 250).map(|t| t.min_bits), Some(100));
	assert_eq!(cache.resolve_cheermote("Cheer", 1).map(|t| t.min_bits), Some(1));
	assert_eq!(cache.resolve_cheermote("Cheer", 1000).map(|t| t.min_bits), Some(1000));
	assert_eq!(cache.resolve_cheermote("Cheer", 99_999).map(|t| t.min_bits), Some(1000));
}

#[test]
fn cheermote_below_lowest_tier_is_unresolved() {
	let mut cache = EnrichmentCache::new();
	cache.load_cheermote_tiers(vec![cheer_set()]);
	assert!(cache.resolve_cheermote("Cheer", 0).is_none());
}

#[test]
fn cheermote_prefix_is_case_insensitive() {
	let mut cache = EnrichmentCache::new();
	cache.load_cheermote_tiers(vec![cheer_set()]);
	assert_eq!(cache.resolve_cheermote("cheer", 5).map(|t| t.min_bits), Some(1));
	assert!(cache.resolve_cheermote("Kappa", 5).is_none());
}

#[test]
fn lookups_before_load_return_none() {
	let cache = EnrichmentCache::new();
	assert!(cache.resolve_cheermote("Cheer", 100).is_none());
	assert!(cache.lookup_badge("subscriber", "0").is_none());
}

#[test]
fn channel_badges_shadow_global_ones() {
	let mut cache = EnrichmentCache::new();
	cache.load_badges(
		vec![badge_set("subscriber", &[("0", "Channel Sub")])],
		vec![
			badge_set("subscriber", &[("0", "Global Sub"), ("3", "Global 3")]),
			badge_set("moderator", &[("1", "Moderator")]),
		],
	);

	assert_eq!(cache.badge_set_count(), 3);
	assert_eq!(
		cache.lookup_badge("subscriber", "0").map(|b| b.title),
		Some("Channel Sub".to_string())
	);
	assert_eq!(cache.lookup_badge("moderator", "1").map(|b| b.title), Some("Moderator".to_string()));
	assert!(cache.lookup_badge("moderator", "2").is_none());
}

#[test]
fn badge_version_missing_from_first_matching_set_is_none() {
	let mut cache = EnrichmentCache::new();
	cache.load_badges(
		vec![badge_set("subscriber", &[("0", "Channel Sub")])],
		vec![badge_set("subscriber", &[("3", "Global 3")])],
	);
	assert!(cache.lookup_badge("subscriber", "3").is_none());
}

#[test]
fn reload_replaces_tables() {
	let mut cache = EnrichmentCache::new();
	cache.load_cheermote_tiers(vec![cheer_set()]);
	cache.load_cheermote_tiers(Vec::new());
	assert!(cache.resolve_cheermote("Cheer", 100).is_none());
	assert_eq!(cache.cheermote_set_count(), 0);
}
