//! Which projects an actor may see.
//!
//! A project is visible when it is active and the actor can view it. Every
//! listing in the crate is derived from [`Visibility::is_visible`], so the
//! flat list, the tree and the scope checks of the activity feed agree.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::Authorizer;
use crate::error::{Error, Result};
use crate::models::*;
use crate::tree::{Forest, ProjectTree};

/// Ancestor links shown above a project. Longer chains are elided in the middle.
const BREADCRUMB_LIMIT: usize = 3;

/// One link of a breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Breadcrumb {
    Project {
        id: Uuid,
        identifier: String,
        name: String,
    },
    /// Stands for the ancestors left out between the root and the nearest parents.
    Elided,
}

impl Breadcrumb {
    fn link(project: &Project) -> Self {
        Self::Project {
            id: project.id,
            identifier: project.identifier.clone(),
            name: project.name.clone(),
        }
    }
}

pub struct Visibility<'a> {
    tree: &'a ProjectTree<'a>,
    authz: &'a dyn Authorizer,
}

impl<'a> Visibility<'a> {
    pub fn new(tree: &'a ProjectTree<'a>, authz: &'a dyn Authorizer) -> Self {
        Self { tree, authz }
    }

    pub fn tree(&self) -> &'a ProjectTree<'a> {
        self.tree
    }

    pub fn authorizer(&self) -> &'a dyn Authorizer {
        self.authz
    }

    pub fn is_visible(&self, actor: &Actor, project: &Project) -> Result<bool> {
        if !project.is_active() {
            return Ok(false);
        }
        self.authz.can_view(actor, project)
    }

    /// Every visible project, in pre-order.
    pub fn visible_projects(&self, actor: &Actor) -> Result<Vec<Project>> {
        let forest = self.tree.forest()?;
        Ok(self
            .visible_in(actor, &forest)?
            .into_iter()
            .cloned()
            .collect())
    }

    fn visible_in<'f>(&self, actor: &Actor, forest: &'f Forest) -> Result<Vec<&'f Project>> {
        let mut visible = Vec::new();
        for project in forest.preorder() {
            if self.is_visible(actor, project)? {
                visible.push(project);
            }
        }
        Ok(visible)
    }

    /// The visible part of the subtree rooted at `project_id`, in pre-order.
    ///
    /// The root itself must be visible; hidden projects below it are skipped
    /// but their visible descendants are kept.
    pub fn visible_descendants(
        &self,
        actor: &Actor,
        project_id: Uuid,
        include_self: bool,
    ) -> Result<Vec<Project>> {
        let root = self.find_visible(actor, &ProjectRef::Id(project_id))?;
        let forest = self.tree.forest()?;

        let mut visible = Vec::new();
        for project in forest.descendants(root.id, include_self) {
            if self.is_visible(actor, project)? {
                visible.push(project.clone());
            }
        }
        Ok(visible)
    }

    /// The forest restricted to visible projects.
    ///
    /// Hidden projects contribute nothing, not even their name; a visible
    /// project under a hidden one is attached to its nearest visible ancestor.
    pub fn visible_tree(&self, actor: &Actor) -> Result<Vec<ProjectTreeNode>> {
        let forest = self.tree.forest()?;
        let visible: HashSet<Uuid> = self
            .visible_in(actor, &forest)?
            .into_iter()
            .map(|p| p.id)
            .collect();

        fn build(
            forest: &Forest,
            children: Vec<&Project>,
            visible: &HashSet<Uuid>,
        ) -> Vec<ProjectTreeNode> {
            let mut nodes = Vec::new();
            for child in children {
                let below = build(forest, forest.children(child.id), visible);
                if visible.contains(&child.id) {
                    nodes.push(ProjectTreeNode {
                        project: child.clone(),
                        children: below,
                    });
                } else {
                    nodes.extend(below);
                }
            }
            nodes
        }

        Ok(build(&forest, forest.roots(), &visible))
    }

    /// Visible ancestors as breadcrumb links, root first.
    ///
    /// More than three links collapse to the root, an [`Breadcrumb::Elided`]
    /// marker and the two nearest parents.
    pub fn breadcrumbs(&self, actor: &Actor, project_id: Uuid) -> Result<Vec<Breadcrumb>> {
        let project = self.find_visible(actor, &ProjectRef::Id(project_id))?;
        let forest = self.tree.forest()?;

        let mut ancestors = Vec::new();
        for ancestor in forest.ancestors(project.id) {
            if self.is_visible(actor, ancestor)? {
                ancestors.push(ancestor);
            }
        }

        if ancestors.len() <= BREADCRUMB_LIMIT {
            return Ok(ancestors.into_iter().map(Breadcrumb::link).collect());
        }

        let nearest = &ancestors[ancestors.len() - 2..];
        let mut trail = vec![Breadcrumb::link(ancestors[0]), Breadcrumb::Elided];
        trail.extend(nearest.iter().map(|p| Breadcrumb::link(p)));
        Ok(trail)
    }

    /// Look up a project the actor can see.
    ///
    /// Unknown and invisible projects fail the same way, so the answer does
    /// not reveal whether a hidden project exists.
    pub fn find_visible(&self, actor: &Actor, key: &ProjectRef) -> Result<Project> {
        let project = self.tree.find(key)?;
        if self.is_visible(actor, &project)? {
            Ok(project)
        } else {
            tracing::debug!("{} cannot see project {}", actor.label(), key);
            Err(Error::not_found("project", key))
        }
    }
}
