#![forbid(unsafe_code)]

use std::collections::HashSet;

/// Cleans raw chat text before it enters the feed.
pub trait Sanitizer: Send + Sync + 'static {
	fn sanitize(&self, input: &str) -> String;
}

/// Drops every tag, removes script and style bodies, then trims.
///
/// Text is re-serialized as HTML, so `<`, `>` and `&` left in plain text come out entity-encoded.
pub struct HtmlSanitizer {
	builder: ammonia::Builder<'static>,
}

impl HtmlSanitizer {
	pub fn new() -> Self {
		let mut builder = ammonia::Builder::empty();
		builder.clean_content_tags(HashSet::from(["script", "style"]));
		Self { builder }
	}
}

impl Default for HtmlSanitizer {
	fn default() -> Self {
		Self::new()
	}
}

impl Sanitizer for HtmlSanitizer {
	fn sanitize(&self, input: &str) -> String {
		self.builder.clean(input).to_string().trim().to_string()
	}
}

/// Trims only. Used where input is already trusted.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrimSanitizer;

impl Sanitizer for TrimSanitizer {
	fn sanitize(&self, input: &str) -> String {
		input.trim().to_string()
	}
}
