use super::grammar::{Directive, DirectiveGrammar};
use super::VoiceoverUnit;

/// Voice assigned to narration outside any `[VOICE: ...]` directive
pub const DEFAULT_VOICE: &str = "DEFAULT";

/// Split one span into voiceover units in source order.
///
/// A single pass over the voice directives emits the literal text before
/// each directive as a [`DEFAULT_VOICE`] unit, then the directive body with
/// its own voice, then whatever literal text trails the last directive.
/// Every piece is trimmed and empty pieces are skipped.
pub fn tag_voices(grammar: &DirectiveGrammar, span_text: &str) -> Vec<VoiceoverUnit> {
    let mut units = Vec::new();
    let mut cursor = 0;

    let voice_directives = grammar.scan(span_text).into_iter().filter_map(|directive| match directive {
        Directive::Voice(voice) => Some(voice),
        Directive::Image(_) => None,
    });

    for directive in voice_directives {
        push_unit(&mut units, span_text, cursor..directive.span.start, DEFAULT_VOICE);

        let voice = if directive.voice.is_empty() {
            DEFAULT_VOICE
        } else {
            directive.voice.as_str()
        };
        push_unit(&mut units, span_text, directive.body_span.clone(), voice);

        cursor = directive.span.end;
    }
    push_unit(&mut units, span_text, cursor..span_text.len(), DEFAULT_VOICE);

    units
}

fn push_unit(units: &mut Vec<VoiceoverUnit>, source: &str, range: std::ops::Range<usize>, voice: &str) {
    let raw = &source[range.clone()];
    let text = raw.trim();
    if text.is_empty() {
        return;
    }

    let leading_whitespace = raw.len() - raw.trim_start().len();
    units.push(VoiceoverUnit {
        text: text.to_string(),
        voice: voice.to_string(),
        offset: range.start + leading_whitespace,
    });
}
