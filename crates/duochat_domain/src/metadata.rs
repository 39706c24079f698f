#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// A badge family with its versions (e.g. `subscriber` with one version per tier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeSet {
	pub set_id: String,
	pub versions: Vec<BadgeVersion>,
}

impl BadgeSet {
	pub fn version(&self, id: &str) -> Option<&BadgeVersion> {
		self.versions.iter().find(|v| v.id == id)
	}
}

/// Display data for one badge version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BadgeVersion {
	pub id: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub image_url_1x: String,
	#[serde(default)]
	pub image_url_2x: String,
	#[serde(default)]
	pub image_url_4x: String,
	#[serde(default)]
	pub click_action: Option<String>,
	#[serde(default)]
	pub click_url: Option<String>,
}

/// Cheermote prefix with its tier table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheermoteSet {
	pub prefix: String,
	pub tiers: Vec<CheermoteTier>,
}

/// One tier of a cheermote, unlocked at `min_bits`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheermoteTier {
	pub id: String,
	pub min_bits: u64,
	#[serde(default)]
	pub color: String,
	#[serde(default)]
	pub can_cheer: bool,
	#[serde(default)]
	pub images: Vec<CheermoteImage>,
}

/// Flattened image entry (`theme`/`format`/`scale` → url).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheermoteImage {
	pub theme: String,
	pub format: String,
	pub scale: String,
	pub url: String,
}
