//! Message segments and chains: the framework's rich-text model.

use serde::{Deserialize, Serialize};

/// A single segment of a [`MessageChain`].
///
/// Modeled as a proper tagged enum rather than the `{type, data}` open shape
/// the source protocol used — the segment vocabulary is closed and known
/// ahead of time, so a tagged enum gives exhaustive matching at every call
/// site instead of stringly-typed field lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageSegment {
	Text { content: String },
	Image { url: String, width: Option<u32>, height: Option<u32> },
	At { user_id: String },
	Face { id: String },
	/// `record` distinguishes a short voice recording from a regular audio
	/// clip; some platforms only accept the former.
	Audio { url: String, record: bool },
	Video { url: String },
	Share { share: ShareKind },
}

impl MessageSegment {
	pub fn text(content: impl Into<String>) -> Self {
		Self::Text { content: content.into() }
	}

	pub fn image(url: impl Into<String>, width: Option<u32>, height: Option<u32>) -> Self {
		Self::Image { url: url.into(), width, height }
	}

	pub fn at(user_id: impl Into<String>) -> Self {
		Self::At { user_id: user_id.into() }
	}

	pub fn face(id: impl Into<String>) -> Self {
		Self::Face { id: id.into() }
	}

	pub fn audio(url: impl Into<String>, record: bool) -> Self {
		Self::Audio { url: url.into(), record }
	}

	pub fn video(url: impl Into<String>) -> Self {
		Self::Video { url: url.into() }
	}

	pub fn share_website(url: impl Into<String>, title: Option<String>, content: Option<String>, image: Option<String>) -> Self {
		Self::Share {
			share: ShareKind::Website { url: url.into(), title, content, image },
		}
	}

	pub fn share_music(platform: impl Into<String>, id: impl Into<String>) -> Self {
		Self::Share {
			share: ShareKind::Music { platform: platform.into(), id: id.into() },
		}
	}

	pub fn share_video(url: impl Into<String>) -> Self {
		Self::Share {
			share: ShareKind::Video { url: url.into() },
		}
	}

	pub fn share_location(lat: f64, lon: f64, title: Option<String>, content: Option<String>) -> Self {
		Self::Share {
			share: ShareKind::Location { lat, lon, title, content },
		}
	}
}

/// Platform-facing share payload. `ShareType` in the source protocol is a
/// bare string discriminant over an all-optional-fields struct; here it is a
/// tagged enum whose variants carry exactly the fields that type uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShareKind {
	Website {
		url: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		title: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		content: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		image: Option<String>,
	},
	Music {
		platform: String,
		id: String,
	},
	Video {
		url: String,
	},
	Location {
		lat: f64,
		lon: f64,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		title: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		content: Option<String>,
	},
}

/// An ordered sequence of [`MessageSegment`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageChain {
	pub segments: Vec<MessageSegment>,
}

impl MessageChain {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_segments(segments: Vec<MessageSegment>) -> Self {
		Self { segments }
	}

	/// Build a chain containing a single text segment.
	pub fn text(content: impl Into<String>) -> Self {
		Self::from_segments(vec![MessageSegment::text(content)])
	}

	pub fn push(&mut self, segment: MessageSegment) -> &mut Self {
		self.segments.push(segment);
		self
	}

	/// Concatenate `text` segments only, trimmed. Non-text segments
	/// (images, mentions, shares, ...) are dropped from the projection.
	pub fn to_plain_text(&self) -> String {
		self.segments
			.iter()
			.filter_map(|seg| match seg {
				MessageSegment::Text { content } => Some(content.as_str()),
				_ => None,
			})
			.collect::<String>()
			.trim()
			.to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn to_plain_text_concatenates_and_trims_text_segments() {
		let chain = MessageChain::from_segments(vec![
			MessageSegment::text(" hello "),
			MessageSegment::at("42"),
			MessageSegment::text("world "),
		]);
		assert_eq!(chain.to_plain_text(), "hello world");
	}

	#[test]
	fn to_plain_text_on_chain_with_no_text_segments_is_empty() {
		let chain = MessageChain::from_segments(vec![MessageSegment::image("http://x", None, None)]);
		assert_eq!(chain.to_plain_text(), "");
	}

	#[test]
	fn round_trips_text_only_chain_through_to_plain_text() {
		let original = "hello world";
		let chain = MessageChain::text(original);
		let recovered = MessageChain::text(chain.to_plain_text());
		assert_eq!(chain.to_plain_text(), recovered.to_plain_text());
	}

	#[test]
	fn segments_serialize_with_a_type_tag() {
		let seg = MessageSegment::at("42");
		let json = serde_json::to_value(&seg).unwrap();
		assert_eq!(json["type"], "at");
		assert_eq!(json["user_id"], "42");
	}
}
