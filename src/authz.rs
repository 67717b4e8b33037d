//! Who may see and who may manage a project.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::tree::ProjectTree;

/// Permission checks consumed by the tree, visibility and the services.
///
/// Both checks ignore the project status; callers that need "active and
/// viewable" go through [`Visibility`](crate::visibility::Visibility).
pub trait Authorizer {
    fn can_view(&self, actor: &Actor, project: &Project) -> Result<bool>;

    fn can_manage(&self, actor: &Actor, project: &Project) -> Result<bool>;

    /// Forget cached rights after memberships changed.
    fn invalidate(&self) {}
}

/// Rights derived from memberships and the admin flag.
///
/// A membership applies to the project and to every project below it. When a
/// user holds roles at several levels, the strongest one wins.
pub struct MembershipAuthorizer<'a> {
    tree: &'a ProjectTree<'a>,
    roles: Mutex<HashMap<Uuid, Arc<HashMap<Uuid, Role>>>>,
}

impl<'a> MembershipAuthorizer<'a> {
    pub fn new(tree: &'a ProjectTree<'a>) -> Self {
        Self {
            tree,
            roles: Mutex::new(HashMap::new()),
        }
    }

    fn roles_of(&self, user_id: Uuid) -> Result<Arc<HashMap<Uuid, Role>>> {
        let mut cache = self.roles.lock().expect("role cache lock poisoned");
        if let Some(roles) = cache.get(&user_id) {
            return Ok(roles.clone());
        }

        let roles: HashMap<Uuid, Role> = self
            .tree
            .store()
            .memberships_of_user(user_id)?
            .into_iter()
            .map(|m| (m.project_id, m.role))
            .collect();
        let roles = Arc::new(roles);
        cache.insert(user_id, roles.clone());
        Ok(roles)
    }

    /// The effective role of the actor on a project, inherited from ancestors.
    pub fn role(&self, actor: &Actor, project: &Project) -> Result<Option<Role>> {
        let Some(user_id) = actor.id() else {
            return Ok(None);
        };
        let roles = self.roles_of(user_id)?;
        if roles.is_empty() {
            return Ok(None);
        }

        let forest = self.tree.forest()?;
        let held: Vec<Role> = std::iter::once(project.id)
            .chain(forest.ancestors(project.id).into_iter().map(|p| p.id))
            .filter_map(|id| roles.get(&id).copied())
            .collect();

        Ok(held
            .iter()
            .copied()
            .find(Role::can_manage)
            .or_else(|| held.first().copied()))
    }
}

impl Authorizer for MembershipAuthorizer<'_> {
    fn can_view(&self, actor: &Actor, project: &Project) -> Result<bool> {
        if project.is_public || actor.is_admin() {
            return Ok(true);
        }
        Ok(self.role(actor, project)?.is_some())
    }

    fn can_manage(&self, actor: &Actor, project: &Project) -> Result<bool> {
        if actor.is_admin() {
            return Ok(true);
        }
        Ok(self.role(actor, project)?.is_some_and(|r| r.can_manage()))
    }

    fn invalidate(&self) {
        self.roles.lock().expect("role cache lock poisoned").clear();
    }
}
