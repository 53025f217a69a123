use std::collections::BTreeSet;

// ── Constants ────────────────────────────────────────────────────────────────

/// Caption prefix used when none are configured ("рисунок", "рис. 1" ...).
pub const DEFAULT_CAPTION_PREFIX: &str = "рис";

// ── Types ────────────────────────────────────────────────────────────────────

/// What the planner knows about a single body paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParagraphInfo {
    pub text: String,
    pub has_picture: bool,
}

impl ParagraphInfo {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            has_picture: false,
        }
    }

    pub fn picture() -> Self {
        Self {
            text: String::new(),
            has_picture: true,
        }
    }

    /// Whitespace-only text and no embedded picture.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && !self.has_picture
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpacingRules {
    /// Matched case-insensitively against the start of the paragraph text.
    pub caption_prefixes: Vec<String>,
    pub space_before_images: bool,
}

impl Default for SpacingRules {
    fn default() -> Self {
        Self {
            caption_prefixes: vec![DEFAULT_CAPTION_PREFIX.to_string()],
            space_before_images: false,
        }
    }
}

impl SpacingRules {
    pub fn is_caption(&self, paragraph: &ParagraphInfo) -> bool {
        let lower = paragraph.text.to_lowercase();
        self.caption_prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .any(|p| lower.starts_with(&p.to_lowercase()))
    }
}

/// Indices of paragraphs that get one empty paragraph inserted right after
/// them. Sorted and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpacerPlan {
    after: Vec<usize>,
}

impl SpacerPlan {
    pub fn indices(&self) -> &[usize] {
        &self.after
    }

    pub fn len(&self) -> usize {
        self.after.len()
    }

    pub fn is_empty(&self) -> bool {
        self.after.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.after.binary_search(&index).is_ok()
    }
}

// ── Planning ─────────────────────────────────────────────────────────────────

/// Decide where spacer paragraphs go. Every decision looks at the sequence
/// as it was uploaded; planned spacers never feed back into later checks.
pub fn plan_spacers(paragraphs: &[ParagraphInfo], rules: &SpacingRules) -> SpacerPlan {
    let mut slots = BTreeSet::new();

    for (i, pair) in paragraphs.windows(2).enumerate() {
        let (current, next) = (&pair[0], &pair[1]);

        // Caption directly followed by content gets a gap below it.
        if rules.is_caption(current) && (!next.text.trim().is_empty() || next.has_picture) {
            slots.insert(i);
        }

        if rules.space_before_images && next.has_picture && !current.is_blank() {
            slots.insert(i);
        }
    }

    SpacerPlan {
        after: slots.into_iter().collect(),
    }
}
