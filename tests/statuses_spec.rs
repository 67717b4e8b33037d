use speculate2::speculate;
use trellis::db::Database;
use trellis::error::Error;
use trellis::models::*;
use trellis::statuses::{StatusMove, StatusService};
use trellis::store::EntityStore;
use uuid::Uuid;

fn status(name: &str, is_closed: bool, is_default: bool) -> CreateIssueStatusInput {
    CreateIssueStatusInput {
        name: name.to_string(),
        is_closed,
        is_default,
    }
}

fn names(statuses: &[IssueStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.name.clone()).collect()
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");

        let admin = Actor::user(db.create_user(CreateUserInput {
            login: "admin".to_string(),
            name: "Admin".to_string(),
            admin: true,
            comments_in_reverse_order: false,
        }).expect("Failed to create user"));
        let jsmith = Actor::user(db.create_user(CreateUserInput {
            login: "jsmith".to_string(),
            name: "John Smith".to_string(),
            admin: false,
            comments_in_reverse_order: false,
        }).expect("Failed to create user"));

        let service = StatusService::new(&db);
        let new = service.create(&admin, status("New", false, true)).expect("Failed to create status");
        let assigned = service.create(&admin, status("Assigned", false, false)).expect("Failed to create status");
        let closed = service.create(&admin, status("Closed", true, false)).expect("Failed to create status");
    }

    describe "create" {
        it "appends statuses in order" {
            let statuses = service.list(&admin).expect("Failed to list");
            assert_eq!(names(&statuses), vec!["New", "Assigned", "Closed"]);
            let positions: Vec<_> = statuses.iter().map(|s| s.position).collect();
            assert_eq!(positions, vec![1, 2, 3]);
        }

        it "keeps a single default" {
            let resolved = service.create(&admin, status("Resolved", false, true)).expect("Failed to create status");

            let defaults: Vec<_> = service
                .list(&admin)
                .expect("Failed to list")
                .into_iter()
                .filter(|s| s.is_default)
                .map(|s| s.id)
                .collect();
            assert_eq!(defaults, vec![resolved.id]);
        }

        it "trims and validates names" {
            let trimmed = service.create(&admin, status("  Feedback ", false, false)).expect("Failed to create status");
            assert_eq!(trimmed.name, "Feedback");

            let blank = service.create(&admin, status("   ", false, false));
            assert!(matches!(blank, Err(Error::Validation(_))));

            let duplicate = service.create(&admin, status("Closed", true, false));
            assert!(matches!(duplicate, Err(Error::Validation(_))));
        }

        it "is reserved to administrators" {
            let result = service.create(&jsmith, status("Rejected", true, false));
            assert!(matches!(result, Err(Error::Permission(_))));
            assert!(matches!(service.list(&Actor::anonymous()), Err(Error::Permission(_))));
        }
    }

    describe "update" {
        it "changes only the given fields" {
            let updated = service
                .update(&admin, closed.id, UpdateIssueStatusInput {
                    name: Some("Done".to_string()),
                    ..Default::default()
                })
                .expect("Failed to update status");

            assert_eq!(updated.name, "Done");
            assert!(updated.is_closed);
            assert_eq!(updated.position, closed.position);
        }

        it "moves the default flag" {
            service
                .update(&admin, assigned.id, UpdateIssueStatusInput {
                    is_default: Some(true),
                    ..Default::default()
                })
                .expect("Failed to update status");

            let statuses = service.list(&admin).expect("Failed to list");
            assert!(!statuses[0].is_default);
            assert!(statuses[1].is_default);
        }

        it "reports unknown statuses" {
            let result = service.update(&admin, Uuid::new_v4(), UpdateIssueStatusInput::default());
            assert!(result.unwrap_err().is_not_found());
        }
    }

    describe "delete" {
        it "removes unused statuses" {
            service.delete(&admin, assigned.id).expect("Failed to delete status");
            assert_eq!(names(&service.list(&admin).expect("Failed to list")), vec!["New", "Closed"]);

            assert!(service.delete(&admin, assigned.id).unwrap_err().is_not_found());
        }

        it "refuses statuses still in use" {
            let project = db.create_project(CreateProjectInput {
                identifier: "ecookbook".to_string(),
                name: "eCookbook".to_string(),
                description: None,
                is_public: true,
                parent_id: None,
                position: None,
            }).expect("Failed to create project");
            let issue = db.create_issue(project.id, CreateIssueInput {
                subject: "Crash".to_string(),
                description: None,
                status_id: None,
                fixed_version_id: None,
                author_id: jsmith.id().unwrap(),
                created_at: None,
            }).expect("Failed to create issue");
            assert_eq!(issue.status_id, new.id);

            let result = service.delete(&admin, new.id);
            assert!(matches!(result, Err(Error::InvalidState(_))));
        }
    }

    describe "reorder" {
        it "moves a status one step" {
            let statuses = service.reorder(&admin, closed.id, StatusMove::Higher).expect("Failed to reorder");
            assert_eq!(names(&statuses), vec!["New", "Closed", "Assigned"]);
        }

        it "moves a status to either end" {
            let statuses = service.reorder(&admin, closed.id, StatusMove::Highest).expect("Failed to reorder");
            assert_eq!(names(&statuses), vec!["Closed", "New", "Assigned"]);

            let statuses = service.reorder(&admin, closed.id, StatusMove::Lowest).expect("Failed to reorder");
            assert_eq!(names(&statuses), vec!["New", "Assigned", "Closed"]);
            let positions: Vec<_> = statuses.iter().map(|s| s.position).collect();
            assert_eq!(positions, vec![1, 2, 3]);
        }

        it "stays put at the edges" {
            let statuses = service.reorder(&admin, new.id, StatusMove::Higher).expect("Failed to reorder");
            assert_eq!(names(&statuses), vec!["New", "Assigned", "Closed"]);
        }

        it "parses move names" {
            assert_eq!(StatusMove::from_str("lowest"), Some(StatusMove::Lowest));
            assert_eq!(StatusMove::Higher.as_str(), "higher");
            assert_eq!(StatusMove::from_str("sideways"), None);
        }
    }
}
