//! Parent resolution for stories.
//!
//! Rust has no class inheritance, so types taking part in a report hierarchy declare
//! their ancestors explicitly (`#[report::story("..", extends(Base))]`). The resulting
//! [`ClassInfo`] tree is walked to find the nearest ancestor that already has a report
//! item.
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::registry::Registry;

/// Declared shape of a type: its name, doc comment and direct ancestors in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub doc: Option<String>,
    pub bases: Vec<ClassInfo>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>) -> ClassInfo {
        ClassInfo {
            name: name.into(),
            doc: None,
            bases: Vec::new(),
        }
    }

    pub fn doc(mut self, doc: Option<&str>) -> ClassInfo {
        self.doc = doc.map(str::to_string);
        self
    }

    pub fn base(mut self, base: ClassInfo) -> ClassInfo {
        self.bases.push(base);
        self
    }

    /// Length of the longest ancestor chain. Types without bases have depth 0.
    pub fn depth(&self) -> usize {
        self.bases
            .iter()
            .map(|base| base.depth() + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Implemented by the `feature`, `story` and `class` attributes.
pub trait Class {
    /// Symbolic key of the type, its bare name.
    const NAME: &'static str;

    fn class_info() -> ClassInfo;
}

/// How far [`nearest_registered`] looks for a registered ancestor.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AncestorSearch {
    /// Follow the first base only. A registered ancestor reachable solely through a
    /// later base is not found and the story becomes a root.
    #[default]
    FirstBranch,
    /// Breadth-first over every ancestor; the nearest registered one wins.
    Exhaustive,
}

/// Returns the registry key of the nearest registered ancestor of `class`, or `None`
/// when the story should become a root item.
pub fn nearest_registered(
    class: &ClassInfo,
    registry: &Registry,
    search: AncestorSearch,
) -> Option<String> {
    match search {
        AncestorSearch::FirstBranch => first_branch(class, registry),
        AncestorSearch::Exhaustive => breadth_first(class, registry),
    }
}

fn first_branch(class: &ClassInfo, registry: &Registry) -> Option<String> {
    // Every declared type sits on top of an implicit, never registered root type, so
    // an unregistered base always has further ancestors and the walk descends into it
    // instead of moving on to its siblings.
    let base = class.bases.first()?;
    if registry.contains(&base.name) {
        return Some(base.name.clone());
    }
    first_branch(base, registry)
}

fn breadth_first(class: &ClassInfo, registry: &Registry) -> Option<String> {
    let mut visited = HashSet::new();
    let mut queue: VecDeque<&ClassInfo> = class.bases.iter().collect();

    while let Some(base) = queue.pop_front() {
        if !visited.insert(base.name.as_str()) {
            continue;
        }
        if registry.contains(&base.name) {
            return Some(base.name.clone());
        }
        queue.extend(base.bases.iter());
    }

    None
}
