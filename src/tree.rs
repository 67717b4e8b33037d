//! The project forest: parent/child navigation and structural writes.
//!
//! Reads go through a [`Forest`], an in-memory snapshot of every project
//! indexed by parent. A [`ProjectTree`] builds the snapshot lazily, keeps it
//! for the rest of the request and drops it after each structural write.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::authz::Authorizer;
use crate::error::{Error, Result};
use crate::models::*;
use crate::store::EntityStore;

/// Snapshot of all projects, with children sorted by `(position, name, id)`.
#[derive(Debug, Default)]
pub struct Forest {
    projects: HashMap<Uuid, Project>,
    children: HashMap<Option<Uuid>, Vec<Uuid>>,
}

impl Forest {
    pub fn new(projects: Vec<Project>) -> Self {
        let ids: HashSet<Uuid> = projects.iter().map(|p| p.id).collect();

        let mut children: HashMap<Option<Uuid>, Vec<&Project>> = HashMap::new();
        for project in &projects {
            // A dangling parent pointer makes the project a root.
            let parent = project.parent_id.filter(|p| ids.contains(p));
            children.entry(parent).or_default().push(project);
        }

        let children = children
            .into_iter()
            .map(|(parent, mut siblings)| {
                siblings.sort_by(|a, b| {
                    a.position
                        .cmp(&b.position)
                        .then_with(|| a.name.cmp(&b.name))
                        .then_with(|| a.id.cmp(&b.id))
                });
                (parent, siblings.into_iter().map(|p| p.id).collect())
            })
            .collect();

        Self {
            projects: projects.into_iter().map(|p| (p.id, p)).collect(),
            children,
        }
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn find(&self, key: &ProjectRef) -> Option<&Project> {
        match key {
            ProjectRef::Id(id) => self.get(*id),
            ProjectRef::Identifier(identifier) => self
                .projects
                .values()
                .find(|p| &p.identifier == identifier),
        }
    }

    pub fn roots(&self) -> Vec<&Project> {
        self.children_under(None)
    }

    pub fn children(&self, id: Uuid) -> Vec<&Project> {
        self.children_under(Some(id))
    }

    fn children_under(&self, parent: Option<Uuid>) -> Vec<&Project> {
        self.children
            .get(&parent)
            .map(|ids| ids.iter().filter_map(|id| self.projects.get(id)).collect())
            .unwrap_or_default()
    }

    /// Ancestors of a project, root first, immediate parent last.
    pub fn ancestors(&self, id: Uuid) -> Vec<&Project> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.get(id).and_then(|p| p.parent_id);

        while let Some(parent_id) = current {
            if !seen.insert(parent_id) {
                break;
            }
            let Some(parent) = self.get(parent_id) else {
                break;
            };
            chain.push(parent);
            current = parent.parent_id;
        }

        chain.reverse();
        chain
    }

    /// Pre-order walk of the subtree rooted at `id`.
    pub fn descendants(&self, id: Uuid, include_self: bool) -> Vec<&Project> {
        let Some(root) = self.get(id) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        if include_self {
            out.push(root);
        }
        self.walk(Some(id), &mut out);
        out
    }

    /// Pre-order walk of the whole forest.
    pub fn preorder(&self) -> Vec<&Project> {
        let mut out = Vec::with_capacity(self.projects.len());
        self.walk(None, &mut out);
        out
    }

    fn walk<'f>(&'f self, parent: Option<Uuid>, out: &mut Vec<&'f Project>) {
        let mut stack: Vec<&Project> = self.children_under(parent).into_iter().rev().collect();
        while let Some(project) = stack.pop() {
            out.push(project);
            stack.extend(self.children(project.id).into_iter().rev());
        }
    }

    /// True when `candidate` is `root` or lies below it.
    pub fn is_in_subtree(&self, candidate: Uuid, root: Uuid) -> bool {
        candidate == root || self.ancestors(candidate).iter().any(|p| p.id == root)
    }

    /// Nested nodes for the subtree rooted at `id`.
    pub fn subtree(&self, id: Uuid) -> Option<ProjectTreeNode> {
        self.get(id).map(|project| self.build_node(project))
    }

    /// Nested nodes for the whole forest.
    pub fn nodes(&self) -> Vec<ProjectTreeNode> {
        self.roots().into_iter().map(|p| self.build_node(p)).collect()
    }

    fn build_node(&self, project: &Project) -> ProjectTreeNode {
        ProjectTreeNode {
            project: project.clone(),
            children: self
                .children(project.id)
                .into_iter()
                .map(|child| self.build_node(child))
                .collect(),
        }
    }
}

/// Request-scoped access to the project hierarchy.
pub struct ProjectTree<'a> {
    store: &'a dyn EntityStore,
    forest: Mutex<Option<Arc<Forest>>>,
}

impl<'a> ProjectTree<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self {
            store,
            forest: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &'a dyn EntityStore {
        self.store
    }

    /// The current snapshot, loaded on first use.
    pub fn forest(&self) -> Result<Arc<Forest>> {
        let mut cached = self.forest.lock().expect("forest cache lock poisoned");
        if let Some(forest) = cached.as_ref() {
            return Ok(forest.clone());
        }

        let forest = Arc::new(Forest::new(self.store.all_projects()?));
        tracing::debug!("Loaded project forest with {} projects", forest.len());
        *cached = Some(forest.clone());
        Ok(forest)
    }

    /// Drop the snapshot so the next read sees the store again.
    pub fn invalidate(&self) {
        *self.forest.lock().expect("forest cache lock poisoned") = None;
    }

    pub fn find(&self, key: &ProjectRef) -> Result<Project> {
        self.forest()?
            .find(key)
            .cloned()
            .ok_or_else(|| Error::not_found("project", key))
    }

    fn get(&self, id: Uuid) -> Result<Project> {
        self.find(&ProjectRef::Id(id))
    }

    /// Ancestors of a project, root first. Empty for a root project.
    pub fn ancestors(&self, project_id: Uuid) -> Result<Vec<Project>> {
        let forest = self.forest()?;
        if forest.get(project_id).is_none() {
            return Err(Error::not_found("project", project_id));
        }
        Ok(forest.ancestors(project_id).into_iter().cloned().collect())
    }

    /// Every project below `project_id` in pre-order, siblings by `(position, name)`.
    pub fn descendants(&self, project_id: Uuid, include_self: bool) -> Result<Vec<Project>> {
        let forest = self.forest()?;
        if forest.get(project_id).is_none() {
            return Err(Error::not_found("project", project_id));
        }
        Ok(forest
            .descendants(project_id, include_self)
            .into_iter()
            .cloned()
            .collect())
    }

    /// The unfiltered subtree rooted at `project_id`.
    pub fn tree(&self, project_id: Uuid) -> Result<ProjectTreeNode> {
        self.forest()?
            .subtree(project_id)
            .ok_or_else(|| Error::not_found("project", project_id))
    }

    /// Move a project under `new_parent`, or to the top level when `None`.
    ///
    /// The actor must manage the project and the new parent. Only
    /// administrators may turn a subproject into a root project.
    pub fn set_parent(
        &self,
        authz: &dyn Authorizer,
        actor: &Actor,
        project_id: Uuid,
        new_parent: Option<Uuid>,
    ) -> Result<Project> {
        let forest = self.forest()?;
        let project = forest
            .get(project_id)
            .cloned()
            .ok_or_else(|| Error::not_found("project", project_id))?;
        let parent = match new_parent {
            Some(parent_id) => Some(
                forest
                    .get(parent_id)
                    .cloned()
                    .ok_or_else(|| Error::not_found("project", parent_id))?,
            ),
            None => None,
        };

        if let Some(parent) = &parent {
            if forest.is_in_subtree(parent.id, project.id) {
                return Err(Error::Cycle {
                    project: project.id,
                    parent: parent.id,
                });
            }
        }

        if !authz.can_manage(actor, &project)? {
            return Err(Error::Permission(format!(
                "{} cannot manage project '{}'",
                actor.label(),
                project.identifier
            )));
        }
        match &parent {
            Some(parent) => {
                if !authz.can_manage(actor, parent)? {
                    return Err(Error::Permission(format!(
                        "{} cannot add subprojects to '{}'",
                        actor.label(),
                        parent.identifier
                    )));
                }
            }
            None => {
                if project.parent_id.is_some() && !actor.is_admin() {
                    return Err(Error::Permission(
                        "only administrators can create root projects".to_string(),
                    ));
                }
            }
        }

        if let Some(parent) = &parent {
            if project.is_active() && !parent.is_active() {
                return Err(Error::InvalidState(format!(
                    "cannot move active project '{}' under archived project '{}'",
                    project.identifier, parent.identifier
                )));
            }
        }

        if project.parent_id == new_parent {
            return Ok(project);
        }

        let result = self
            .store
            .move_project(project.id, new_parent, project.lock_version);
        self.invalidate();
        let moved = result?;

        tracing::info!(
            "{} moved project '{}' under {}",
            actor.label(),
            moved.identifier,
            parent.map_or_else(|| "the top level".to_string(), |p| format!("'{}'", p.identifier))
        );
        Ok(moved)
    }

    /// Archive a project with its whole subtree. Administrators only.
    ///
    /// Returns how many projects changed; archiving twice changes nothing.
    pub fn archive(&self, actor: &Actor, project_id: Uuid) -> Result<usize> {
        require_admin(actor, "archive projects")?;
        let project = self.get(project_id)?;

        let changed = self.store.archive_subtree(project.id)?;
        self.invalidate();

        tracing::info!(
            "{} archived project '{}' ({} projects changed)",
            actor.label(),
            project.identifier,
            changed
        );
        Ok(changed)
    }

    /// Reactivate one project. Its descendants stay archived.
    pub fn unarchive(&self, actor: &Actor, project_id: Uuid) -> Result<()> {
        require_admin(actor, "unarchive projects")?;
        let project = self.get(project_id)?;

        let forest = self.forest()?;
        if let Some(archived) = forest
            .ancestors(project.id)
            .into_iter()
            .find(|p| !p.is_active())
        {
            return Err(Error::InvalidState(format!(
                "project '{}' cannot be unarchived while ancestor '{}' is archived",
                project.identifier, archived.identifier
            )));
        }

        self.store.unarchive_project(project.id)?;
        self.invalidate();

        tracing::info!("{} unarchived project '{}'", actor.label(), project.identifier);
        Ok(())
    }

    /// Create a project. Root projects need an administrator; subprojects
    /// need manage rights on the parent. A non-admin creator becomes manager.
    pub fn create_project(
        &self,
        authz: &dyn Authorizer,
        actor: &Actor,
        input: CreateProjectInput,
    ) -> Result<Project> {
        match input.parent_id {
            None => require_admin(actor, "create root projects")?,
            Some(parent_id) => {
                let parent = self.get(parent_id)?;
                if !authz.can_manage(actor, &parent)? {
                    return Err(Error::Permission(format!(
                        "{} cannot add subprojects to '{}'",
                        actor.label(),
                        parent.identifier
                    )));
                }
            }
        }

        let project = self.store.create_project(input)?;
        self.invalidate();

        if let Some(user_id) = actor.id().filter(|_| !actor.is_admin()) {
            self.store.add_member(project.id, user_id, Role::Manager)?;
            authz.invalidate();
        }

        tracing::info!("{} created project '{}'", actor.label(), project.identifier);
        Ok(project)
    }

    /// Delete a project and everything below it. Administrators only.
    pub fn destroy(&self, actor: &Actor, project_id: Uuid) -> Result<()> {
        require_admin(actor, "delete projects")?;
        let project = self.get(project_id)?;

        let deleted = self.store.delete_project(project.id)?;
        self.invalidate();
        if !deleted {
            return Err(Error::not_found("project", project_id));
        }

        tracing::info!("{} deleted project '{}'", actor.label(), project.identifier);
        Ok(())
    }
}

fn require_admin(actor: &Actor, action: &str) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(Error::Permission(format!(
            "only administrators can {}",
            action
        )))
    }
}
