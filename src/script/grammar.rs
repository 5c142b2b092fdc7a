use regex::Regex;
use serde::Serialize;
use std::ops::Range;

/// `[IMAGE: <keyword><optional count>]`
pub const IMAGE_PATTERN: &str = r"(?s)\[IMAGE:\s*(.+?)(\d*?)\]";

/// `[VOICE: <voice-id>]<body>[/VOICE]`, body ends at the nearest closing tag
pub const VOICE_PATTERN: &str = r"(?s)\[VOICE:\s*(.+?)\](.+?)\[/VOICE\]";

/// The two directive kinds a script may carry, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveKind {
    Image,
    Voice,
}

impl DirectiveKind {
    pub fn pattern(&self) -> &'static str {
        match self {
            DirectiveKind::Image => IMAGE_PATTERN,
            DirectiveKind::Voice => VOICE_PATTERN,
        }
    }

    /// Literal that opens a directive of this kind
    pub fn opening_tag(&self) -> &'static str {
        match self {
            DirectiveKind::Image => "[IMAGE:",
            DirectiveKind::Voice => "[VOICE:",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveKind::Image => "image",
            DirectiveKind::Voice => "voice",
        }
    }
}

impl std::fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Image count as written in the directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCount {
    /// No trailing digits
    Default,
    Explicit(u32),
    /// Digits that do not fit a count
    Unparsable(String),
}

impl ImageCount {
    fn from_digits(digits: &str) -> Self {
        if digits.is_empty() {
            return ImageCount::Default;
        }
        digits
            .parse::<u32>()
            .map(ImageCount::Explicit)
            .unwrap_or_else(|_| ImageCount::Unparsable(digits.to_string()))
    }

    /// Explicit counts win, everything else falls back to `default`
    pub fn resolve(&self, default: u32) -> u32 {
        match self {
            ImageCount::Explicit(count) => *count,
            ImageCount::Default | ImageCount::Unparsable(_) => default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDirective {
    /// Trimmed search keyword
    pub keyword: String,
    pub count: ImageCount,
    /// Byte range of the whole directive in the source text
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceDirective {
    /// Trimmed voice identifier
    pub voice: String,
    /// Raw body between the opening and closing tags
    pub body: String,
    pub body_span: Range<usize>,
    pub span: Range<usize>,
}

/// A recognized directive, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Image(ImageDirective),
    Voice(VoiceDirective),
}

impl Directive {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Directive::Image(_) => DirectiveKind::Image,
            Directive::Voice(_) => DirectiveKind::Voice,
        }
    }

    pub fn span(&self) -> &Range<usize> {
        match self {
            Directive::Image(image) => &image.span,
            Directive::Voice(voice) => &voice.span,
        }
    }
}

/// Compiled directive patterns.
///
/// Built once and handed to the segmenter and the voice tagger; it holds no
/// mutable state so one value can serve any number of parses.
#[derive(Debug, Clone)]
pub struct DirectiveGrammar {
    image: Regex,
    voice: Regex,
}

impl DirectiveGrammar {
    /// Compile the standard grammar
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_patterns(DirectiveKind::Image.pattern(), DirectiveKind::Voice.pattern())
    }

    /// Compile a grammar from custom patterns.
    ///
    /// The image pattern needs a keyword group and a digits group, the voice
    /// pattern a voice-id group and a body group.
    pub fn with_patterns(image: &str, voice: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            image: Regex::new(image)?,
            voice: Regex::new(voice)?,
        })
    }

    /// All image directives in source order
    pub fn image_directives(&self, text: &str) -> Vec<ImageDirective> {
        self.image
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let keyword = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let digits = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                Some(ImageDirective {
                    keyword: keyword.trim().to_string(),
                    count: ImageCount::from_digits(digits),
                    span: whole.range(),
                })
            })
            .collect()
    }

    /// Text between image directives: always one more piece than there are directives
    pub fn split_on_images<'g, 't>(&'g self, text: &'t str) -> regex::Split<'g, 't> {
        self.image.split(text)
    }

    /// All terminated voice directives in source order
    pub fn voice_directives(&self, text: &str) -> Vec<VoiceDirective> {
        self.voice
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let voice = caps.get(1)?;
                let body = caps.get(2)?;
                Some(VoiceDirective {
                    voice: voice.as_str().trim().to_string(),
                    body: body.as_str().to_string(),
                    body_span: body.range(),
                    span: whole.range(),
                })
            })
            .collect()
    }

    /// Both directive kinds merged in source order.
    ///
    /// Image directives delimit segments, so they always stand. A voice
    /// directive that overlaps any image directive is dropped.
    pub fn scan(&self, text: &str) -> Vec<Directive> {
        let images = self.image_directives(text);
        let voices: Vec<VoiceDirective> = self
            .voice_directives(text)
            .into_iter()
            .filter(|voice| !images.iter().any(|image| overlaps(&image.span, &voice.span)))
            .collect();

        let mut all: Vec<Directive> = images
            .into_iter()
            .map(Directive::Image)
            .chain(voices.into_iter().map(Directive::Voice))
            .collect();
        all.sort_by_key(|d| (d.span().start, d.kind()));
        all
    }

    /// Byte offsets of `[VOICE:` openings that no surviving voice directive covers
    pub fn unterminated_voice_tags(&self, text: &str) -> Vec<usize> {
        let covered: Vec<Range<usize>> = self
            .scan(text)
            .into_iter()
            .filter_map(|directive| match directive {
                Directive::Voice(voice) => Some(voice.span),
                Directive::Image(_) => None,
            })
            .collect();
        text.match_indices(DirectiveKind::Voice.opening_tag())
            .map(|(offset, _)| offset)
            .filter(|offset| !covered.iter().any(|range| range.contains(offset)))
            .collect()
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}
