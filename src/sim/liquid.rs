//! Bucket liquefaction
//!
//! Resident balls are not drawn individually once they reach a bucket. They
//! are "liquefied" into a stacked bar: one coloured segment per tag, each as
//! tall as its share of the simulation-wide bucket capacity, topped with
//! empty space.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::topology::{Bucket, LogicalLocation};

/// Colour of the unfilled part of a bar
pub const EMPTY_COLOUR: [f32; 3] = [1.0, 1.0, 1.0];
/// Colour of balls that never passed a tagged bucket
pub const UNTAGGED_COLOUR: [f32; 3] = [0.35, 0.45, 0.6];

/// Colours handed out to tags in order of first appearance
const PALETTE: [[f32; 3]; 8] = [
    [0.9, 0.3, 0.25],
    [0.25, 0.65, 0.35],
    [0.95, 0.7, 0.2],
    [0.55, 0.35, 0.8],
    [0.2, 0.7, 0.8],
    [0.9, 0.45, 0.7],
    [0.6, 0.5, 0.3],
    [0.4, 0.4, 0.4],
];

/// Stable tag -> colour assignment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagPalette {
    assigned: Vec<String>,
}

impl TagPalette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Colour for a tag, assigning the next palette entry on first sight
    pub fn colour(&mut self, tag: Option<&str>) -> [f32; 3] {
        let Some(tag) = tag else {
            return UNTAGGED_COLOUR;
        };
        let slot = match self.assigned.iter().position(|t| t == tag) {
            Some(slot) => slot,
            None => {
                self.assigned.push(tag.to_string());
                self.assigned.len() - 1
            }
        };
        PALETTE[slot % PALETTE.len()]
    }

    /// Colour for a tag without assigning one
    pub fn peek(&self, tag: Option<&str>) -> [f32; 3] {
        match tag.and_then(|tag| self.assigned.iter().position(|t| t == tag)) {
            Some(slot) => PALETTE[slot % PALETTE.len()],
            None => UNTAGGED_COLOUR,
        }
    }
}

/// One coloured layer of a liquid bar
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidSegment {
    pub tag: Option<String>,
    pub colour: [f32; 3],
    /// Share of the bar's full height
    pub fraction: f32,
}

/// Stacked bar for one bucket, bottom segment first
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidBar {
    pub segments: Vec<LiquidSegment>,
    /// Unfilled share of the bar, drawn on top
    pub empty: f32,
}

impl LiquidBar {
    /// Total filled share, `resident / capacity`
    pub fn filled(&self) -> f32 {
        self.segments.iter().map(|s| s.fraction).sum()
    }
}

/// Count resident balls per tag (untagged balls under `None`)
pub fn liquefied_balls_by_tag(bucket: &Bucket) -> BTreeMap<Option<String>, usize> {
    let mut counts = BTreeMap::new();
    for tag in bucket.balls().tags() {
        *counts.entry(tag.map(str::to_string)).or_insert(0) += 1;
    }
    counts
}

/// Build the stacked bar for a bucket at the given capacity. `capacity`
/// must be positive; `Settings::effective_capacity` clamps it.
pub fn liquid_bar_structure(bucket: &Bucket, capacity: f32, palette: &TagPalette) -> LiquidBar {
    let segments: Vec<LiquidSegment> = liquefied_balls_by_tag(bucket)
        .into_iter()
        .map(|(tag, count)| LiquidSegment {
            colour: palette.peek(tag.as_deref()),
            tag,
            fraction: count as f32 / capacity,
        })
        .collect();
    let filled = bucket.balls().len() as f32 / capacity;
    LiquidBar {
        segments,
        empty: (1.0 - filled).max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::topology::{BallId, BucketId};
    use proptest::prelude::*;

    fn filled_bucket(tags: &[Option<&str>]) -> Bucket {
        let mut bucket = Bucket::new(BucketId(0), 0, 1);
        for (i, tag) in tags.iter().enumerate() {
            bucket
                .balls_mut()
                .insert(BallId(i as u32), tag.map(str::to_string));
        }
        bucket
    }

    #[test]
    fn test_groups_by_tag() {
        let bucket = filled_bucket(&[Some("a"), None, Some("a"), Some("b")]);
        let counts = liquefied_balls_by_tag(&bucket);
        assert_eq!(counts.get(&Some("a".to_string())), Some(&2));
        assert_eq!(counts.get(&Some("b".to_string())), Some(&1));
        assert_eq!(counts.get(&None), Some(&1));
    }

    #[test]
    fn test_bar_fractions_and_empty_space() {
        let mut palette = TagPalette::new();
        let red = palette.colour(Some("red"));
        let bucket = filled_bucket(&[Some("red"), Some("red"), None]);

        let bar = liquid_bar_structure(&bucket, 10.0, &palette);
        assert_eq!(bar.segments.len(), 2);
        // Untagged sorts first
        assert_eq!(bar.segments[0].tag, None);
        assert_eq!(bar.segments[0].colour, UNTAGGED_COLOUR);
        assert_eq!(bar.segments[1].colour, red);
        assert!((bar.segments[1].fraction - 0.2).abs() < 1e-6);
        assert!((bar.filled() - 0.3).abs() < 1e-6);
        assert!((bar.empty - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_empty_bucket_is_all_empty_space() {
        let bar = liquid_bar_structure(&filled_bucket(&[]), 5.0, &TagPalette::new());
        assert!(bar.segments.is_empty());
        assert_eq!(bar.empty, 1.0);
    }

    #[test]
    fn test_fractional_capacity_is_used_as_given() {
        let bucket = filled_bucket(&[None]);
        let bar = liquid_bar_structure(&bucket, 0.5, &TagPalette::new());
        assert!((bar.segments[0].fraction - 2.0).abs() < 1e-6);
        assert!((bar.filled() - 2.0).abs() < 1e-6);
        assert_eq!(bar.empty, 0.0);
    }

    #[test]
    fn test_palette_is_stable_and_cycles() {
        let mut palette = TagPalette::new();
        let first = palette.colour(Some("t0"));
        for i in 1..PALETTE.len() {
            palette.colour(Some(format!("t{i}").as_str()));
        }
        assert_eq!(palette.colour(Some("t0")), first);
        assert_eq!(palette.colour(Some("wrapped")), first);
        assert_eq!(palette.peek(Some("unseen")), UNTAGGED_COLOUR);
    }

    proptest! {
        #[test]
        fn prop_segments_sum_to_fill_ratio(
            tags in proptest::collection::vec(proptest::option::of(0u8..4), 0..40),
            capacity in 40.0f32..200.0,
        ) {
            let names: Vec<Option<String>> =
                tags.iter().map(|t| t.map(|t| format!("tag{t}"))).collect();
            let refs: Vec<Option<&str>> = names.iter().map(|t| t.as_deref()).collect();
            let bucket = filled_bucket(&refs);
            let bar = liquid_bar_structure(&bucket, capacity, &TagPalette::new());
            let expected = tags.len() as f32 / capacity;
            prop_assert!((bar.filled() - expected).abs() < 1e-4);
            prop_assert!((bar.filled() + bar.empty - 1.0).abs() < 1e-4);
            prop_assert!(bar.filled() <= 1.0 + 1e-6);
        }
    }
}
