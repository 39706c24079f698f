#![forbid(unsafe_code)]

use crate::feed::sanitize::{HtmlSanitizer, Sanitizer, TrimSanitizer};

#[test]
fn tags_are_stripped_and_text_kept() {
	let s = HtmlSanitizer::new();
	assert_eq!(s.sanitize("hello <b>world</b>"), "hello world");
	assert_eq!(s.sanitize("<a href=\"https://x.test\">link</a> text"), "link text");
}

#[test]
fn script_and_style_bodies_are_removed() {
	let s = HtmlSanitizer::new();
	assert_eq!(s.sanitize("<script>alert(1)</script>hi"), "hi");
	assert_eq!(s.sanitize("<style>body{color:red}</style> styled "), "styled");
}

#[test]
fn markup_only_input_becomes_empty() {
	let s = HtmlSanitizer::new();
	assert_eq!(s.sanitize("<img src=x onerror=alert(1)>"), "");
	assert_eq!(s.sanitize("   \t  "), "");
}

#[test]
fn plain_text_passes_through_trimmed() {
	let s = HtmlSanitizer::new();
	assert_eq!(s.sanitize("  Kappa PogChamp  "), "Kappa PogChamp");
}

#[test]
fn trim_sanitizer_only_trims() {
	assert_eq!(TrimSanitizer.sanitize("  <b>x</b> "), "<b>x</b>");
}
