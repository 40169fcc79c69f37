// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Archive Name Rendering
//!
//! Renders the configured naming pattern into per-volume archive base
//! names. The pattern carries four tokens:
//!
//! - `{date}` - the run date, pre-rendered with `naming.date_fmt`
//! - `{token}` - the stable 5-hex-char host token
//! - `{disk}` - disk ordinal in discovery order
//! - `{part}` - partition ordinal within the disk (0 for whole devices)
//!
//! Names must be pairwise distinct within one run; [`uniquify`] appends
//! `-2`, `-3`, ... to later duplicates so collisions from sparse patterns
//! (for example one omitting `{part}`) still produce distinct spool and
//! remote directories.

use serde::{Deserialize, Serialize};

/// A validated archive-name pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamePattern {
    pattern: String,
}

impl NamePattern {
    /// Pattern used when the configuration does not set one.
    pub const DEFAULT: &'static str = "{date}-{token}-d{disk}p{part}";

    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Render the pattern for one volume.
    pub fn render(&self, date: &str, token: &str, disk: usize, part: usize) -> String {
        self.pattern
            .replace("{date}", date)
            .replace("{token}", token)
            .replace("{disk}", &disk.to_string())
            .replace("{part}", &part.to_string())
    }
}

impl Default for NamePattern {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

/// Make every name in the slice distinct by suffixing later duplicates.
///
/// The first occurrence keeps its rendered name; the second becomes
/// `name-2`, the third `name-3`, and so on. Order is preserved.
pub fn uniquify(names: &mut [String]) {
    use std::collections::HashMap;

    let mut seen: HashMap<String, usize> = HashMap::new();
    for name in names.iter_mut() {
        let count = seen.entry(name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            *name = format!("{}-{}", name, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_render_default_pattern() {
        let pattern = NamePattern::default();
        assert_eq!(
            pattern.render("20260801", "a1b2c", 1, 2),
            "20260801-a1b2c-d1p2"
        );
    }

    #[test]
    fn test_render_custom_pattern() {
        let pattern = NamePattern::new("{token}_{date}");
        assert_eq!(pattern.render("20260801", "a1b2c", 0, 0), "a1b2c_20260801");
    }

    #[test]
    fn test_uniquify_appends_ordinal_suffix() {
        let mut names = vec![
            "base".to_string(),
            "base".to_string(),
            "other".to_string(),
            "base".to_string(),
        ];
        uniquify(&mut names);
        assert_eq!(names, vec!["base", "base-2", "other", "base-3"]);
    }

    #[test]
    fn test_uniquify_noop_on_distinct() {
        let mut names = vec!["a".to_string(), "b".to_string()];
        uniquify(&mut names);
        assert_eq!(names, vec!["a", "b"]);
    }

    proptest! {
        #[test]
        fn prop_uniquify_yields_distinct_names(raw in proptest::collection::vec("[a-z]{1,4}", 0..20)) {
            let mut names = raw;
            uniquify(&mut names);
            let mut sorted = names.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), names.len());
        }
    }
}
