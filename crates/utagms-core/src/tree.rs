use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Category, CategoryId, CriterionCategory, CriterionId, ProjectSnapshot};

/// In-memory view of a project's category hierarchy and criterion
/// assignments.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    active: BTreeMap<CategoryId, bool>,
    children: BTreeMap<CategoryId, Vec<CategoryId>>,
    criteria: BTreeMap<CategoryId, BTreeSet<CriterionId>>,
}

impl CategoryTree {
    #[must_use]
    pub fn new(categories: &[Category], assignments: &[CriterionCategory]) -> Self {
        let mut tree = Self::default();
        for category in categories {
            tree.active.insert(category.id, category.active);
            if let Some(parent_id) = category.parent_id {
                tree.children.entry(parent_id).or_default().push(category.id);
            }
        }
        for assignment in assignments {
            tree.criteria
                .entry(assignment.category_id)
                .or_default()
                .insert(assignment.criterion_id);
        }
        tree
    }

    #[must_use]
    pub fn from_snapshot(snapshot: &ProjectSnapshot) -> Self {
        Self::new(&snapshot.categories, &snapshot.criterion_categories)
    }

    #[must_use]
    pub fn contains(&self, category_id: CategoryId) -> bool {
        self.active.contains_key(&category_id)
    }

    /// The category itself plus every descendant reachable through a chain of
    /// active categories. The starting category is included even when it is
    /// inactive; an unknown id yields an empty set.
    #[must_use]
    pub fn categories_subtree(&self, category_id: CategoryId) -> BTreeSet<CategoryId> {
        let mut visited = BTreeSet::new();
        if !self.contains(category_id) {
            return visited;
        }

        let mut pending = vec![category_id];
        visited.insert(category_id);
        while let Some(current) = pending.pop() {
            let Some(children) = self.children.get(&current) else {
                continue;
            };
            for child in children {
                if !self.active.get(child).copied().unwrap_or(false) {
                    continue;
                }
                if visited.insert(*child) {
                    pending.push(*child);
                }
            }
        }
        visited
    }

    /// Distinct criteria assigned to any category of the active subtree.
    #[must_use]
    pub fn criteria_for_category(&self, category_id: CategoryId) -> BTreeSet<CriterionId> {
        self.categories_subtree(category_id)
            .iter()
            .filter_map(|id| self.criteria.get(id))
            .flatten()
            .copied()
            .collect()
    }
}
