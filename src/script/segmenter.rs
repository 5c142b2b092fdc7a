use super::grammar::{DirectiveGrammar, ImageDirective};

/// One span of text paired with the image directive that introduced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSegment {
    pub span_text: String,
    pub image_keyword: String,
    pub image_count: u32,
}

/// Result of splitting a script on its image directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    /// Trimmed text before the first image directive, if any
    pub leading_text: Option<String>,
    pub segments: Vec<RawSegment>,
}

/// Split `text` on image directives and pair every following span with its directive.
///
/// Spans are trimmed and empty ones are discarded together with their
/// directive. Text before the first directive has no directive to pair with
/// and is handed back separately in [`Segmentation::leading_text`].
pub fn segment(grammar: &DirectiveGrammar, text: &str, default_image_count: u32) -> Segmentation {
    let directives = grammar.image_directives(text);
    let mut spans = grammar.split_on_images(text);

    let leading_text = spans
        .next()
        .map(str::trim)
        .filter(|span| !span.is_empty())
        .map(str::to_string);

    let segments = spans
        .zip(directives.iter())
        .filter_map(|(span, directive)| pair(span, directive, default_image_count))
        .collect();

    Segmentation {
        leading_text,
        segments,
    }
}

fn pair(span: &str, directive: &ImageDirective, default_image_count: u32) -> Option<RawSegment> {
    let span_text = span.trim();
    if span_text.is_empty() {
        return None;
    }

    Some(RawSegment {
        span_text: span_text.to_string(),
        image_keyword: directive.keyword.clone(),
        image_count: directive.count.resolve(default_image_count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> Segmentation {
        segment(&DirectiveGrammar::new().unwrap(), text, 5)
    }

    #[test]
    fn test_pairs_spans_with_preceding_directive() {
        let result = run("[IMAGE: cats]A cat sat.[IMAGE: dogs3]A dog ran.");
        assert_eq!(result.leading_text, None);
        assert_eq!(
            result.segments,
            vec![
                RawSegment {
                    span_text: "A cat sat.".to_string(),
                    image_keyword: "cats".to_string(),
                    image_count: 5,
                },
                RawSegment {
                    span_text: "A dog ran.".to_string(),
                    image_keyword: "dogs".to_string(),
                    image_count: 3,
                },
            ]
        );
    }

    #[test]
    fn test_leading_text_is_set_aside() {
        let result = run("  Welcome!  [IMAGE: sea] Waves.");
        assert_eq!(result.leading_text.as_deref(), Some("Welcome!"));
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].image_keyword, "sea");
        assert_eq!(result.segments[0].span_text, "Waves.");
    }

    #[test]
    fn test_empty_span_drops_its_directive() {
        let result = run("[IMAGE: a][IMAGE: b] text for b");
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].image_keyword, "b");
    }

    #[test]
    fn test_text_without_directives() {
        let result = run("Just prose.");
        assert_eq!(result.leading_text.as_deref(), Some("Just prose."));
        assert!(result.segments.is_empty());
    }

    #[test]
    fn test_custom_default_count() {
        let result = segment(&DirectiveGrammar::new().unwrap(), "[IMAGE: owl] Hoot.", 2);
        assert_eq!(result.segments[0].image_count, 2);
    }

    #[test]
    fn test_explicit_zero_count_is_kept() {
        let result = run("[IMAGE: void0] Nothing to see.");
        assert_eq!(result.segments[0].image_keyword, "void");
        assert_eq!(result.segments[0].image_count, 0);
    }
}
