//! Style events and their segmentation into non-overlapping runs.

use bindery_types::AnchorId;
use itertools::Itertools;
use std::collections::BTreeSet;

/// An inline range overlaying a text entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleEvent {
    pub offset: usize,
    pub length: usize,
    pub style: String,
    pub link_to: Option<AnchorId>,
    /// Footnote links render as popup references.
    pub footnote: bool,
}

impl StyleEvent {
    pub fn new(offset: usize, length: usize, style: impl Into<String>) -> Self {
        Self {
            offset,
            length,
            style: style.into(),
            link_to: None,
            footnote: false,
        }
    }

    pub fn with_link(mut self, link: AnchorId, footnote: bool) -> Self {
        self.link_to = Some(link);
        self.footnote = footnote;
        self
    }

    fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Ranks an event for the dedup and covering tie-breaks: a link wins, then
/// the longer style name.
fn specificity(e: &StyleEvent) -> (bool, usize) {
    (e.link_to.is_some(), e.style.len())
}

/// Turns a possibly nested, overlapping, duplicated event list into sorted
/// non-overlapping runs.
///
/// Within each elementary span between boundary points, the shortest
/// covering event wins (inner ranges are more specific); ties go to the
/// event with a link, then the longer style name. Abutting runs that agree
/// on style and link merge back together.
pub fn segment_events(events: Vec<StyleEvent>) -> Vec<StyleEvent> {
    let mut events: Vec<StyleEvent> = events.into_iter().filter(|e| e.length > 0).collect();
    if events.is_empty() {
        return events;
    }

    // Deduplicate by exact range, keeping the most specific entry.
    events.sort_by_key(|e| (e.offset, e.length, std::cmp::Reverse(specificity(e))));
    events.dedup_by(|b, a| b.offset == a.offset && b.length == a.length);

    let boundaries: BTreeSet<usize> = events
        .iter()
        .flat_map(|e| [e.offset, e.end()])
        .collect();

    let mut segments: Vec<StyleEvent> = Vec::new();
    for (&start, &end) in boundaries.iter().tuple_windows() {
        let covering = events
            .iter()
            .filter(|e| e.offset <= start && e.end() >= end)
            .min_by(|a, b| {
                a.length
                    .cmp(&b.length)
                    .then_with(|| specificity(b).cmp(&specificity(a)))
            });
        let Some(cover) = covering else {
            continue; // a gap between disjoint events
        };

        match segments.last_mut() {
            Some(prev)
                if prev.end() == start
                    && prev.style == cover.style
                    && prev.link_to == cover.link_to
                    && prev.footnote == cover.footnote =>
            {
                prev.length += end - start;
            }
            _ => {
                segments.push(StyleEvent {
                    offset: start,
                    length: end - start,
                    style: cover.style.clone(),
                    link_to: cover.link_to.clone(),
                    footnote: cover.footnote,
                });
            }
        }
    }
    segments
}

/// Inserts `base_style` runs over every position of `[0, total_len)` not
/// covered by an event. Used on heading titles to guarantee a base
/// line-height everywhere.
pub fn fill_style_event_gaps(
    events: Vec<StyleEvent>,
    total_len: usize,
    base_style: &str,
) -> Vec<StyleEvent> {
    let mut out = Vec::with_capacity(events.len() + 2);
    let mut cursor = 0;
    for event in events {
        if event.offset > cursor {
            out.push(StyleEvent::new(cursor, event.offset - cursor, base_style));
        }
        cursor = cursor.max(event.end());
        out.push(event);
    }
    if cursor < total_len {
        out.push(StyleEvent::new(cursor, total_len - cursor, base_style));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_ranges_split_around_the_inner_run() {
        // emphasis over the whole text, strong nested inside.
        let events = vec![
            StyleEvent::new(0, 16, "emphasis"),
            StyleEvent::new(7, 4, "emphasis-strong"),
        ];
        let out = segment_events(events);
        assert_eq!(
            out,
            vec![
                StyleEvent::new(0, 7, "emphasis"),
                StyleEvent::new(7, 4, "emphasis-strong"),
                StyleEvent::new(11, 5, "emphasis"),
            ]
        );
    }

    #[test]
    fn non_overlap_and_order_hold_for_any_input() {
        let events = vec![
            StyleEvent::new(3, 10, "a"),
            StyleEvent::new(0, 20, "bb"),
            StyleEvent::new(5, 2, "ccc"),
            StyleEvent::new(3, 10, "dddd"),
        ];
        let out = segment_events(events);
        for pair in out.windows(2) {
            assert!(pair[0].offset + pair[0].length <= pair[1].offset);
        }
    }

    #[test]
    fn duplicate_ranges_prefer_link_then_longer_name() {
        let linked = StyleEvent::new(0, 5, "x").with_link(AnchorId::new("n1"), false);
        let out = segment_events(vec![StyleEvent::new(0, 5, "longer-name"), linked.clone()]);
        assert_eq!(out, vec![linked]);

        let out = segment_events(vec![
            StyleEvent::new(0, 5, "s"),
            StyleEvent::new(0, 5, "longer-name"),
        ]);
        assert_eq!(out[0].style, "longer-name");
    }

    #[test]
    fn abutting_equal_runs_merge() {
        let events = vec![StyleEvent::new(0, 4, "s"), StyleEvent::new(4, 4, "s")];
        assert_eq!(segment_events(events), vec![StyleEvent::new(0, 8, "s")]);
    }

    #[test]
    fn gaps_between_disjoint_events_stay_uncovered() {
        let events = vec![StyleEvent::new(0, 2, "a"), StyleEvent::new(6, 2, "b")];
        let out = segment_events(events);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].end(), 2);
        assert_eq!(out[1].offset, 6);
    }

    #[test]
    fn gap_fill_covers_everything() {
        let events = vec![StyleEvent::new(2, 3, "head")];
        let out = fill_style_event_gaps(events, 10, "base");
        assert_eq!(
            out,
            vec![
                StyleEvent::new(0, 2, "base"),
                StyleEvent::new(2, 3, "head"),
                StyleEvent::new(5, 5, "base"),
            ]
        );
    }

    #[test]
    fn zero_length_events_are_dropped() {
        assert!(segment_events(vec![StyleEvent::new(3, 0, "x")]).is_empty());
    }
}
