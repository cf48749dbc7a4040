use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown stage name: {0:?}")]
pub struct UnknownStageError(pub String);

//
// ─── STAGE CATALOG ─────────────────────────────────────────────────────────────
//

/// One of the six fixed phases every course is made of.
///
/// The declaration order is the catalog order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Intro,
    Pretest,
    Lessons,
    Posttest,
    Postwork,
    #[serde(rename = "finalproject")]
    FinalProject,
}

impl Stage {
    /// The stage catalog, in the order a learner walks through a course.
    ///
    /// Every ordering or "all stages" check in the engine goes through this
    /// constant.
    pub const CATALOG: [Stage; 6] = [
        Stage::Intro,
        Stage::Pretest,
        Stage::Lessons,
        Stage::Posttest,
        Stage::Postwork,
        Stage::FinalProject,
    ];

    /// Last stage of the catalog; where a finished learner resumes.
    pub const LAST: Stage = Stage::FinalProject;

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Intro => "intro",
            Stage::Pretest => "pretest",
            Stage::Lessons => "lessons",
            Stage::Posttest => "posttest",
            Stage::Postwork => "postwork",
            Stage::FinalProject => "finalproject",
        }
    }

    /// Zero-based position in the catalog.
    #[must_use]
    pub fn position(self) -> usize {
        self as usize
    }
}

/// Returns the fixed, ordered stage catalog.
#[must_use]
pub fn catalog() -> &'static [Stage] {
    &Stage::CATALOG
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = UnknownStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::CATALOG
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStageError(s.to_owned()))
    }
}

//
// ─── STAGE SET ─────────────────────────────────────────────────────────────────
//

/// Insertion-ordered set of completed stages.
///
/// Membership ignores order; iteration yields stages in the order they were
/// first recorded, which is what learners see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageSet(Vec<Stage>);

/// Result of reading client-supplied stage names leniently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LenientStages {
    pub stages: StageSet,
    /// Names that are not in the catalog, in submission order.
    pub unknown: Vec<String>,
}

impl StageSet {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse names, keeping catalog stages and setting aside anything else.
    ///
    /// Duplicates collapse onto their first occurrence.
    #[must_use]
    pub fn parse_lenient<S: AsRef<str>>(names: &[S]) -> LenientStages {
        let mut out = LenientStages::default();
        for name in names {
            match name.as_ref().parse::<Stage>() {
                Ok(stage) => {
                    out.stages.insert(stage);
                }
                Err(UnknownStageError(raw)) => out.unknown.push(raw),
            }
        }
        out
    }

    /// Adds a stage; returns `false` if it was already present.
    pub fn insert(&mut self, stage: Stage) -> bool {
        if self.contains(stage) {
            return false;
        }
        self.0.push(stage);
        true
    }

    #[must_use]
    pub fn contains(&self, stage: Stage) -> bool {
        self.0.contains(&stage)
    }

    /// True when every catalog stage is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        Stage::CATALOG.iter().all(|stage| self.contains(*stage))
    }

    /// Union keeping `self`'s order, then `other`'s new stages in their order.
    #[must_use]
    pub fn union(&self, other: &StageSet) -> StageSet {
        let mut merged = self.clone();
        for stage in other.iter() {
            merged.insert(stage);
        }
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Stage] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|stage| stage.as_str()).collect()
    }
}

impl FromIterator<Stage> for StageSet {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        let mut set = StageSet::new();
        for stage in iter {
            set.insert(stage);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_order_is_fixed() {
        let names: Vec<_> = catalog().iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            ["intro", "pretest", "lessons", "posttest", "postwork", "finalproject"]
        );
        assert_eq!(Stage::LAST, *catalog().last().unwrap());
    }

    #[test]
    fn parses_every_catalog_name() {
        for stage in Stage::CATALOG {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert!("final_project".parse::<Stage>().is_err());
        assert!("Intro".parse::<Stage>().is_err());
    }

    #[test]
    fn lenient_parse_sets_aside_unknown_names() {
        let parsed = StageSet::parse_lenient(&["pretest", "quiz", "intro", "pretest"]);
        assert_eq!(parsed.stages.as_slice(), &[Stage::Pretest, Stage::Intro]);
        assert_eq!(parsed.unknown, vec!["quiz".to_string()]);
    }

    #[test]
    fn union_preserves_first_seen_order() {
        let stored: StageSet = [Stage::Pretest, Stage::Intro].into_iter().collect();
        let incoming: StageSet = [Stage::Intro, Stage::Lessons].into_iter().collect();
        let merged = stored.union(&incoming);
        assert_eq!(
            merged.as_slice(),
            &[Stage::Pretest, Stage::Intro, Stage::Lessons]
        );
    }

    #[test]
    fn complete_only_with_all_six() {
        let mut set: StageSet = Stage::CATALOG[..5].iter().copied().collect();
        assert!(!set.is_complete());
        set.insert(Stage::FinalProject);
        assert!(set.is_complete());
    }
}
