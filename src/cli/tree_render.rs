//! ASCII tree rendering for project hierarchies.

use crate::models::{Project, ProjectTreeNode};

const PUBLIC: char = '◉';
const PRIVATE: char = '◌';
const ARCHIVED: char = '✗';

fn project_symbol(project: &Project) -> char {
    if !project.is_active() {
        ARCHIVED
    } else if project.is_public {
        PUBLIC
    } else {
        PRIVATE
    }
}

/// Render a project forest as ASCII art.
///
/// Example output:
/// ```text
/// ◉ eCookbook (ecookbook)
/// ├── ◉ eCookbook Subproject 1 (subproject1)
/// │   └── ◌ Private child (private-child)
/// └── ✗ Old release (old)
/// ◌ OnlineStore (onlinestore)
/// ```
pub fn render_tree(nodes: &[ProjectTreeNode]) -> String {
    let mut output = String::new();
    for node in nodes {
        push_label(&mut output, &node.project);
        render_children(&mut output, &node.children, "");
    }
    output
}

fn push_label(output: &mut String, project: &Project) {
    output.push(project_symbol(project));
    output.push(' ');
    output.push_str(&project.name);
    output.push_str(" (");
    output.push_str(&project.identifier);
    output.push_str(")\n");
}

fn render_children(output: &mut String, children: &[ProjectTreeNode], prefix: &str) {
    for (i, child) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;
        output.push_str(prefix);
        output.push_str(if is_last { "└── " } else { "├── " });
        push_label(output, &child.project);

        let continuation = if is_last { "    " } else { "│   " };
        render_children(output, &child.children, &format!("{}{}", prefix, continuation));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn make_node(name: &str, public: bool, archived: bool, children: Vec<ProjectTreeNode>) -> ProjectTreeNode {
        ProjectTreeNode {
            project: Project {
                id: Uuid::new_v4(),
                identifier: name.to_lowercase().replace(' ', "-"),
                name: name.to_string(),
                description: None,
                is_public: public,
                status: if archived {
                    ProjectStatus::Archived
                } else {
                    ProjectStatus::Active
                },
                parent_id: None,
                position: 1,
                lock_version: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            children,
        }
    }

    #[test]
    fn test_single_root() {
        let tree = vec![make_node("Cookbook", true, false, vec![])];
        assert_eq!(render_tree(&tree), "◉ Cookbook (cookbook)\n");
    }

    #[test]
    fn test_nested_children() {
        let tree = vec![
            make_node(
                "Cookbook",
                true,
                false,
                vec![
                    make_node(
                        "Sub One",
                        true,
                        false,
                        vec![make_node("Secret", false, false, vec![])],
                    ),
                    make_node("Old", true, true, vec![]),
                ],
            ),
            make_node("Store", false, false, vec![]),
        ];
        let expected = "◉ Cookbook (cookbook)\n├── ◉ Sub One (sub-one)\n│   └── ◌ Secret (secret)\n└── ✗ Old (old)\n◌ Store (store)\n";
        assert_eq!(render_tree(&tree), expected);
    }
}
