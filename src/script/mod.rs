use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub mod grammar;
pub mod segmenter;
pub mod voices;

pub use grammar::{Directive, DirectiveGrammar, DirectiveKind, ImageCount};
pub use voices::DEFAULT_VOICE;

/// Image count used when a directive does not name one
pub const DEFAULT_IMAGE_COUNT: u32 = 5;

/// One voice-tagged piece of narration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceoverUnit {
    /// Trimmed, never empty
    pub text: String,

    /// Voice identifier, [`DEFAULT_VOICE`] when untagged
    pub voice: String,

    /// Byte offset of `text` within the segment's raw span
    pub offset: usize,
}

/// A unit of the video: narration plus the imagery shown during it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// 1-based, contiguous within one parse
    pub ordinal: usize,

    /// Trimmed span text, directives included
    pub source_text: String,

    /// Narration in playback order
    pub voiceover_units: Vec<VoiceoverUnit>,

    /// Image search keyword, empty for segments without imagery
    pub image_keyword: String,

    /// Number of images to show
    pub image_count: u32,
}

impl Segment {
    /// Whether this segment asks for any images at all
    pub fn wants_images(&self) -> bool {
        !self.image_keyword.is_empty() && self.image_count > 0
    }
}

/// Options controlling how scripts are split into segments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserOptions {
    /// Image count for directives without a trailing number
    pub default_image_count: u32,

    /// Turn text before the first image directive into an imageless segment
    /// instead of dropping it
    pub keep_leading_text: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            default_image_count: DEFAULT_IMAGE_COUNT,
            keep_leading_text: false,
        }
    }
}

/// Non-fatal findings about a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Text before the first image directive that will not be narrated
    LeadingTextDropped { preview: String },

    /// An image directive with nothing after it
    EmptySpan { keyword: String, offset: usize },

    /// A count that could not be read and fell back to the default
    UnparsableCount { keyword: String, raw: String, fallback: u32 },

    /// A `[VOICE:` opening with no matching `[/VOICE]`
    UnterminatedVoiceTag { offset: usize },

    /// A voice directive whose body is blank
    EmptyVoiceBody { voice: String, offset: usize },

    /// A voice id the voice table does not map; the default voice reads it
    UnknownVoice { voice: String, ordinal: usize },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::LeadingTextDropped { preview } => {
                write!(f, "text before the first [IMAGE: ...] directive is dropped: \"{}\"", preview)
            }
            Diagnostic::EmptySpan { keyword, offset } => {
                write!(f, "[IMAGE: {}] at byte {} has no text and is skipped", keyword, offset)
            }
            Diagnostic::UnparsableCount { keyword, raw, fallback } => write!(
                f,
                "image count '{}' for '{}' is not a valid number, using {}",
                raw, keyword, fallback
            ),
            Diagnostic::UnterminatedVoiceTag { offset } => write!(
                f,
                "[VOICE: ...] at byte {} has no closing [/VOICE] and is read as plain text",
                offset
            ),
            Diagnostic::EmptyVoiceBody { voice, offset } => {
                write!(f, "[VOICE: {}] at byte {} has an empty body", voice, offset)
            }
            Diagnostic::UnknownVoice { voice, ordinal } => write!(
                f,
                "voice '{}' in segment #{} is not configured, {} is used",
                voice, ordinal, DEFAULT_VOICE
            ),
        }
    }
}

/// Segments of a script together with what the parser noticed along the way
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedScript {
    pub segments: Vec<Segment>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedScript {
    /// Report every voice `is_known` rejects, once per segment
    pub fn flag_unknown_voices(&mut self, is_known: impl Fn(&str) -> bool) {
        for segment in &self.segments {
            let mut seen = BTreeSet::new();
            for unit in &segment.voiceover_units {
                if !is_known(&unit.voice) && seen.insert(unit.voice.as_str()) {
                    self.diagnostics.push(Diagnostic::UnknownVoice {
                        voice: unit.voice.clone(),
                        ordinal: segment.ordinal,
                    });
                }
            }
        }
    }
}

/// Turns annotated text into ordered [`Segment`]s
#[derive(Debug, Clone)]
pub struct ScriptParser {
    grammar: DirectiveGrammar,
    options: ParserOptions,
}

impl ScriptParser {
    /// Create a parser with the standard directive grammar
    pub fn new(options: ParserOptions) -> crate::Result<Self> {
        let grammar = DirectiveGrammar::new()?;
        Ok(Self::with_grammar(grammar, options))
    }

    pub fn with_grammar(grammar: DirectiveGrammar, options: ParserOptions) -> Self {
        Self { grammar, options }
    }

    pub fn grammar(&self) -> &DirectiveGrammar {
        &self.grammar
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Build the ordered segment list for `text`
    pub fn build_segments(&self, text: &str) -> Vec<Segment> {
        let segmentation = segmenter::segment(&self.grammar, text, self.options.default_image_count);

        let leading = segmentation
            .leading_text
            .filter(|_| self.options.keep_leading_text)
            .map(|span_text| segmenter::RawSegment {
                span_text,
                image_keyword: String::new(),
                image_count: 0,
            });

        leading
            .into_iter()
            .chain(segmentation.segments)
            .enumerate()
            .map(|(index, raw)| Segment {
                ordinal: index + 1,
                voiceover_units: voices::tag_voices(&self.grammar, &raw.span_text),
                source_text: raw.span_text,
                image_keyword: raw.image_keyword,
                image_count: raw.image_count,
            })
            .collect()
    }

    /// Build segments and collect diagnostics
    pub fn parse(&self, text: &str) -> ParsedScript {
        ParsedScript {
            segments: self.build_segments(text),
            diagnostics: self.diagnose(text),
        }
    }

    fn diagnose(&self, text: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let directives = self.grammar.scan(text);
        let mut spans = self.grammar.split_on_images(text);

        if let Some(leading) = spans.next().map(str::trim).filter(|s| !s.is_empty()) {
            if !self.options.keep_leading_text {
                diagnostics.push(Diagnostic::LeadingTextDropped {
                    preview: preview(leading),
                });
            }
        }

        let images = directives.iter().filter_map(|directive| match directive {
            Directive::Image(image) => Some(image),
            Directive::Voice(_) => None,
        });
        for (span, image) in spans.zip(images) {
            if span.trim().is_empty() {
                diagnostics.push(Diagnostic::EmptySpan {
                    keyword: image.keyword.clone(),
                    offset: image.span.start,
                });
            }
        }

        for directive in &directives {
            match directive {
                Directive::Image(image) => {
                    if let ImageCount::Unparsable(raw) = &image.count {
                        diagnostics.push(Diagnostic::UnparsableCount {
                            keyword: image.keyword.clone(),
                            raw: raw.clone(),
                            fallback: self.options.default_image_count,
                        });
                    }
                }
                Directive::Voice(voice) => {
                    if voice.body.trim().is_empty() {
                        diagnostics.push(Diagnostic::EmptyVoiceBody {
                            voice: voice.voice.clone(),
                            offset: voice.span.start,
                        });
                    }
                }
            }
        }

        diagnostics.extend(
            self.grammar
                .unterminated_voice_tags(text)
                .into_iter()
                .map(|offset| Diagnostic::UnterminatedVoiceTag { offset }),
        );

        diagnostics
    }
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 40;
    if text.chars().count() <= MAX_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ScriptParser {
        ScriptParser::new(ParserOptions::default()).unwrap()
    }

    #[test]
    fn test_two_segment_script() {
        let segments = parser().build_segments("[IMAGE: cats]A cat sat.[IMAGE: dogs3]A dog ran.");
        assert_eq!(segments.len(), 2);

        assert_eq!(segments[0].ordinal, 1);
        assert_eq!(segments[0].image_keyword, "cats");
        assert_eq!(segments[0].image_count, 5);
        assert!(segments[0].source_text.contains("A cat sat."));

        assert_eq!(segments[1].ordinal, 2);
        assert_eq!(segments[1].image_keyword, "dogs");
        assert_eq!(segments[1].image_count, 3);
        assert!(segments[1].source_text.contains("A dog ran."));
    }

    #[test]
    fn test_n_directives_give_n_contiguous_ordinals() {
        let text = "[IMAGE: a] one [IMAGE: b] two [IMAGE: c] three [IMAGE: d4] four";
        let segments = parser().build_segments(text);
        let ordinals: Vec<usize> = segments.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_segments_carry_voiceover_units() {
        let segments =
            parser().build_segments("[IMAGE: city] [VOICE: A]Hello[/VOICE] world");
        let units = &segments[0].voiceover_units;
        assert_eq!(units.len(), 2);
        assert_eq!((units[0].voice.as_str(), units[0].text.as_str()), ("A", "Hello"));
        assert_eq!((units[1].voice.as_str(), units[1].text.as_str()), (DEFAULT_VOICE, "world"));
    }

    #[test]
    fn test_build_segments_is_deterministic() {
        let text = "Intro [IMAGE: a2] [VOICE: B]x[/VOICE] y [IMAGE: b] z";
        let p = parser();
        assert_eq!(p.build_segments(text), p.build_segments(text));
    }

    #[test]
    fn test_leading_text_dropped_by_default() {
        let parsed = parser().parse("Welcome. [IMAGE: sun] Morning.");
        assert_eq!(parsed.segments.len(), 1);
        assert_eq!(parsed.segments[0].image_keyword, "sun");
        assert_eq!(
            parsed.diagnostics,
            vec![Diagnostic::LeadingTextDropped {
                preview: "Welcome.".to_string()
            }]
        );
    }

    #[test]
    fn test_leading_text_kept_as_imageless_segment() {
        let options = ParserOptions {
            keep_leading_text: true,
            ..ParserOptions::default()
        };
        let parsed = ScriptParser::new(options).unwrap().parse("Welcome. [IMAGE: sun] Morning.");

        assert_eq!(parsed.segments.len(), 2);
        assert_eq!(parsed.segments[0].ordinal, 1);
        assert_eq!(parsed.segments[0].image_keyword, "");
        assert!(!parsed.segments[0].wants_images());
        assert_eq!(parsed.segments[1].ordinal, 2);
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn test_diagnostics_for_malformed_directives() {
        let text = "[IMAGE: a][IMAGE: b99999999999] text [VOICE: Q] [/VOICE] then [VOICE: Z]open";
        let parsed = parser().parse(text);

        assert!(parsed.diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::EmptyVoiceBody { voice, .. } if voice == "Q"
        )));

        assert!(parsed
            .diagnostics
            .contains(&Diagnostic::EmptySpan { keyword: "a".to_string(), offset: 0 }));
        assert!(parsed.diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::UnparsableCount { keyword, fallback: 5, .. } if keyword == "b"
        )));
        assert!(parsed
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::UnterminatedVoiceTag { .. })));
    }

    #[test]
    fn test_unknown_voices_flagged_once_per_segment() {
        let text = "[IMAGE: a] [VOICE: Z]hi[/VOICE] [VOICE: Z]again[/VOICE] [VOICE: A]ok[/VOICE] [IMAGE: b] [VOICE: Z]bye[/VOICE]";
        let mut parsed = parser().parse(text);
        parsed.flag_unknown_voices(|voice| voice != "Z");

        assert_eq!(
            parsed.diagnostics,
            vec![
                Diagnostic::UnknownVoice { voice: "Z".to_string(), ordinal: 1 },
                Diagnostic::UnknownVoice { voice: "Z".to_string(), ordinal: 2 },
            ]
        );
        assert!(parsed.diagnostics[0].to_string().contains("DEFAULT is used"));
    }

    #[test]
    fn test_no_directives_means_no_segments() {
        let parsed = parser().parse("Nothing tagged here.");
        assert!(parsed.segments.is_empty());
        assert_eq!(parsed.diagnostics.len(), 1);
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "word ".repeat(20);
        let shown = preview(long.trim());
        assert!(shown.ends_with("..."));
        assert!(shown.chars().count() <= 43);
    }
}
