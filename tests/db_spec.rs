use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use speculate2::speculate;
use trellis::db::Database;
use trellis::error::Error;
use trellis::models::*;
use trellis::store::{EntityStore, EventFilter};
use uuid::Uuid;

fn create_project(db: &Database, identifier: &str, parent: Option<&Project>) -> Project {
    db.create_project(CreateProjectInput {
        identifier: identifier.to_string(),
        name: identifier.to_string(),
        description: None,
        is_public: true,
        parent_id: parent.map(|p| p.id),
        position: None,
    })
    .expect("Failed to create project")
}

fn create_user(db: &Database, login: &str) -> User {
    db.create_user(CreateUserInput {
        login: login.to_string(),
        name: login.to_string(),
        admin: false,
        comments_in_reverse_order: false,
    })
    .expect("Failed to create user")
}

fn create_status(db: &Database, name: &str, is_closed: bool, is_default: bool) -> IssueStatus {
    db.create_issue_status(CreateIssueStatusInput {
        name: name.to_string(),
        is_closed,
        is_default,
    })
    .expect("Failed to create status")
}

fn create_version(db: &Database, project: &Project, name: &str, due: Option<NaiveDate>) -> Version {
    db.create_version(
        project.id,
        CreateVersionInput {
            name: name.to_string(),
            description: None,
            due_date: due,
        },
    )
    .expect("Failed to create version")
}

fn create_issue(db: &Database, project: &Project, author: &User, subject: &str) -> Issue {
    db.create_issue(
        project.id,
        CreateIssueInput {
            subject: subject.to_string(),
            description: None,
            status_id: None,
            fixed_version_id: None,
            author_id: author.id,
            created_at: None,
        },
    )
    .expect("Failed to create issue")
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
}

fn window(from: DateTime<Utc>, to: DateTime<Utc>) -> ActivityWindow {
    ActivityWindow { from, to }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "projects" {
        describe "create_project" {
            it "creates a root project with defaults" {
                let project = create_project(&db, "ecookbook", None);

                assert_eq!(project.identifier, "ecookbook");
                assert!(project.is_public);
                assert!(project.is_active());
                assert!(project.parent_id.is_none());
                assert_eq!(project.lock_version, 0);
            }

            it "appends subprojects after their siblings" {
                let root = create_project(&db, "root", None);
                let first = create_project(&db, "first", Some(&root));
                let second = create_project(&db, "second", Some(&root));

                assert!(first.position < second.position);
                let children = db.children_of(root.id).expect("Query failed");
                let ids: Vec<Uuid> = children.iter().map(|p| p.id).collect();
                assert_eq!(ids, vec![first.id, second.id]);
            }

            it "rejects a duplicate identifier" {
                create_project(&db, "ecookbook", None);
                let result = db.create_project(CreateProjectInput {
                    identifier: "ecookbook".to_string(),
                    name: "Other".to_string(),
                    description: None,
                    is_public: true,
                    parent_id: None,
                    position: None,
                });
                assert!(matches!(result, Err(Error::Validation(_))));
            }

            it "rejects a malformed identifier" {
                let result = db.create_project(CreateProjectInput {
                    identifier: "Not Valid".to_string(),
                    name: "Other".to_string(),
                    description: None,
                    is_public: true,
                    parent_id: None,
                    position: None,
                });
                assert!(matches!(result, Err(Error::Validation(_))));
            }

            it "rejects an unknown parent" {
                let result = db.create_project(CreateProjectInput {
                    identifier: "orphan".to_string(),
                    name: "Orphan".to_string(),
                    description: None,
                    is_public: true,
                    parent_id: Some(Uuid::new_v4()),
                    position: None,
                });
                assert!(result.unwrap_err().is_not_found());
            }

            it "rejects an archived parent" {
                let root = create_project(&db, "root", None);
                db.archive_subtree(root.id).expect("Failed to archive");

                let result = db.create_project(CreateProjectInput {
                    identifier: "child".to_string(),
                    name: "Child".to_string(),
                    description: None,
                    is_public: true,
                    parent_id: Some(root.id),
                    position: None,
                });
                assert!(matches!(result, Err(Error::InvalidState(_))));
            }
        }

        describe "find_project" {
            it "finds by id and by identifier" {
                let project = create_project(&db, "ecookbook", None);

                let by_id = db.find_project(&ProjectRef::Id(project.id)).expect("Query failed");
                let by_identifier = db.find_project(&"ecookbook".into()).expect("Query failed");

                assert_eq!(by_id.map(|p| p.id), Some(project.id));
                assert_eq!(by_identifier.map(|p| p.id), Some(project.id));
            }

            it "returns None for unknown keys" {
                assert!(db.find_project(&ProjectRef::Id(Uuid::new_v4())).expect("Query failed").is_none());
                assert!(db.find_project(&"missing".into()).expect("Query failed").is_none());
            }
        }

        describe "move_project" {
            it "reparents and bumps the lock version" {
                let a = create_project(&db, "a", None);
                let b = create_project(&db, "b", None);

                let moved = db.move_project(b.id, Some(a.id), b.lock_version).expect("Failed to move");

                assert_eq!(moved.parent_id, Some(a.id));
                assert_eq!(moved.lock_version, b.lock_version + 1);
            }

            it "refuses a stale lock version" {
                let a = create_project(&db, "a", None);
                let b = create_project(&db, "b", None);
                db.move_project(b.id, Some(a.id), b.lock_version).expect("Failed to move");

                let result = db.move_project(b.id, None, b.lock_version);
                assert!(matches!(result, Err(Error::Conflict(id)) if id == b.id));
            }

            it "refuses to move a project into its own subtree" {
                let a = create_project(&db, "a", None);
                let b = create_project(&db, "b", Some(&a));
                let c = create_project(&db, "c", Some(&b));

                let result = db.move_project(a.id, Some(c.id), a.lock_version);
                assert!(matches!(result, Err(Error::Cycle { .. })));

                let result = db.move_project(a.id, Some(a.id), a.lock_version);
                assert!(matches!(result, Err(Error::Cycle { .. })));
            }
        }

        describe "archive_subtree" {
            it "archives every descendant and is idempotent" {
                let root = create_project(&db, "root", None);
                let child = create_project(&db, "child", Some(&root));
                create_project(&db, "grandchild", Some(&child));
                let other = create_project(&db, "other", None);

                assert_eq!(db.archive_subtree(child.id).expect("Failed to archive"), 2);
                assert_eq!(db.archive_subtree(child.id).expect("Failed to archive"), 0);

                let statuses: Vec<(String, bool)> = db
                    .all_projects()
                    .expect("Query failed")
                    .into_iter()
                    .map(|p| (p.identifier.clone(), p.is_active()))
                    .collect();
                assert!(statuses.contains(&("root".to_string(), true)));
                assert!(statuses.contains(&("child".to_string(), false)));
                assert!(statuses.contains(&("grandchild".to_string(), false)));
                assert!(db.find_project(&other.id.into()).unwrap().unwrap().is_active());
            }
        }

        describe "unarchive_project" {
            it "reactivates only the project itself" {
                let root = create_project(&db, "root", None);
                let child = create_project(&db, "child", Some(&root));
                db.archive_subtree(root.id).expect("Failed to archive");

                db.unarchive_project(root.id).expect("Failed to unarchive");

                assert!(db.find_project(&root.id.into()).unwrap().unwrap().is_active());
                assert!(!db.find_project(&child.id.into()).unwrap().unwrap().is_active());
            }

            it "fails while an ancestor is archived" {
                let root = create_project(&db, "root", None);
                let child = create_project(&db, "child", Some(&root));
                db.archive_subtree(root.id).expect("Failed to archive");

                let result = db.unarchive_project(child.id);
                assert!(matches!(result, Err(Error::InvalidState(_))));
            }
        }

        describe "delete_project" {
            it "removes the subtree with its versions and files" {
                let user = create_user(&db, "jsmith");
                let root = create_project(&db, "root", None);
                let child = create_project(&db, "child", Some(&root));
                let version = create_version(&db, &child, "1.0", None);
                for container in [AttachmentContainer::project(child.id), AttachmentContainer::version(version.id)] {
                    db.create_attachment(container, CreateAttachmentInput {
                        filename: "notes.txt".to_string(),
                        filesize: 10,
                        content_type: None,
                        author_id: user.id,
                        created_at: None,
                    }).expect("Failed to attach");
                }

                assert!(db.delete_project(root.id).expect("Failed to delete"));

                assert!(db.all_projects().expect("Query failed").is_empty());
                assert!(db.find_version(version.id).expect("Query failed").is_none());
                assert!(db.attachments_of(&AttachmentContainer::project(child.id)).expect("Query failed").is_empty());
                assert!(db.attachments_of(&AttachmentContainer::version(version.id)).expect("Query failed").is_empty());
                assert!(!db.delete_project(root.id).expect("Failed to delete"));
            }
        }
    }

    describe "members" {
        it "adds a member and updates the role on re-add" {
            let project = create_project(&db, "ecookbook", None);
            let user = create_user(&db, "jsmith");

            db.add_member(project.id, user.id, Role::Reporter).expect("Failed to add member");
            let updated = db.add_member(project.id, user.id, Role::Manager).expect("Failed to add member");

            assert_eq!(updated.role, Role::Manager);
            let memberships = db.memberships_of_user(user.id).expect("Query failed");
            assert_eq!(memberships.len(), 1);
            assert_eq!(memberships[0].role, Role::Manager);
        }

        it "rejects unknown users" {
            let project = create_project(&db, "ecookbook", None);
            let result = db.add_member(project.id, Uuid::new_v4(), Role::Reporter);
            assert!(result.unwrap_err().is_not_found());
        }

        it "looks users up by login" {
            let user = create_user(&db, "jsmith");
            let found = db.find_user_by_login("jsmith").expect("Query failed");
            assert_eq!(found.map(|u| u.id), Some(user.id));
            assert!(db.find_user_by_login("nobody").expect("Query failed").is_none());
        }
    }

    describe "versions" {
        it "orders dated versions first, then undated by name" {
            let project = create_project(&db, "ecookbook", None);
            let day = |d| NaiveDate::from_ymd_opt(2024, 6, d);
            create_version(&db, &project, "zeta", None);
            create_version(&db, &project, "late", day(20));
            create_version(&db, &project, "alpha", None);
            create_version(&db, &project, "early", day(1));

            let names: Vec<String> = db
                .versions_of(project.id)
                .expect("Query failed")
                .into_iter()
                .map(|v| v.name)
                .collect();
            assert_eq!(names, vec!["early", "late", "alpha", "zeta"]);
        }

        it "rejects a duplicate name in the same project" {
            let project = create_project(&db, "ecookbook", None);
            create_version(&db, &project, "1.0", None);
            let result = db.create_version(project.id, CreateVersionInput {
                name: "1.0".to_string(),
                description: None,
                due_date: None,
            });
            assert!(matches!(result, Err(Error::Validation(_))));
        }

        it "counts open and closed issues" {
            let open = create_status(&db, "New", false, true);
            let closed = create_status(&db, "Closed", true, false);
            let user = create_user(&db, "jsmith");
            let project = create_project(&db, "ecookbook", None);
            let version = create_version(&db, &project, "1.0", None);

            for status in [&open, &closed, &closed] {
                db.create_issue(project.id, CreateIssueInput {
                    subject: "Work".to_string(),
                    description: None,
                    status_id: Some(status.id),
                    fixed_version_id: Some(version.id),
                    author_id: user.id,
                    created_at: None,
                }).expect("Failed to create issue");
            }
            create_issue(&db, &project, &user, "Unplanned");

            let progress = db.version_progress(version.id).expect("Query failed");
            assert_eq!(progress, VersionProgress { open_issues: 1, closed_issues: 2 });
        }
    }

    describe "issues" {
        it "numbers issues sequentially with the default status" {
            create_status(&db, "Closed", true, false);
            let new = create_status(&db, "New", false, true);
            let user = create_user(&db, "jsmith");
            let project = create_project(&db, "ecookbook", None);

            let first = create_issue(&db, &project, &user, "First");
            let second = create_issue(&db, &project, &user, "Second");

            assert_eq!(first.number, 1);
            assert_eq!(second.number, 2);
            assert_eq!(first.status_id, new.id);
        }

        it "fails without any status" {
            let user = create_user(&db, "jsmith");
            let project = create_project(&db, "ecookbook", None);
            let result = db.create_issue(project.id, CreateIssueInput {
                subject: "First".to_string(),
                description: None,
                status_id: None,
                fixed_version_id: None,
                author_id: user.id,
                created_at: None,
            });
            assert!(matches!(result, Err(Error::Validation(_))));
        }

        it "refuses a version of another project" {
            create_status(&db, "New", false, true);
            let user = create_user(&db, "jsmith");
            let project = create_project(&db, "ecookbook", None);
            let other = create_project(&db, "other", None);
            let version = create_version(&db, &other, "1.0", None);

            let result = db.create_issue(project.id, CreateIssueInput {
                subject: "First".to_string(),
                description: None,
                status_id: None,
                fixed_version_id: Some(version.id),
                author_id: user.id,
                created_at: None,
            });
            assert!(matches!(result, Err(Error::Validation(_))));
        }

        it "journals edits with their status transition" {
            let new = create_status(&db, "New", false, true);
            let closed = create_status(&db, "Closed", true, false);
            let user = create_user(&db, "jsmith");
            let project = create_project(&db, "ecookbook", None);
            let issue = create_issue(&db, &project, &user, "Crash");

            db.update_issue(issue.id, UpdateIssueInput {
                author_id: user.id,
                subject: None,
                status_id: None,
                fixed_version_id: None,
                notes: Some("Looking into it".to_string()),
                edited_at: Some(issue.created_at + Duration::minutes(1)),
            }).expect("Failed to update");
            let updated = db.update_issue(issue.id, UpdateIssueInput {
                author_id: user.id,
                subject: None,
                status_id: Some(closed.id),
                fixed_version_id: None,
                notes: None,
                edited_at: Some(issue.created_at + Duration::minutes(2)),
            }).expect("Failed to update").expect("Issue missing");

            assert_eq!(updated.status_id, closed.id);
            let journals = db.get_journals(issue.id).expect("Query failed");
            assert_eq!(journals.len(), 2);
            assert_eq!(journals[0].notes.as_deref(), Some("Looking into it"));
            assert!(journals[0].new_status_id.is_none());
            assert_eq!(journals[1].old_status_id, Some(new.id));
            assert_eq!(journals[1].new_status_id, Some(closed.id));
        }

        it "records nothing for an empty edit" {
            create_status(&db, "New", false, true);
            let user = create_user(&db, "jsmith");
            let project = create_project(&db, "ecookbook", None);
            let issue = create_issue(&db, &project, &user, "Crash");

            db.update_issue(issue.id, UpdateIssueInput {
                author_id: user.id,
                subject: Some("Crash".to_string()),
                status_id: None,
                fixed_version_id: None,
                notes: None,
                edited_at: None,
            }).expect("Failed to update");

            assert!(db.get_journals(issue.id).expect("Query failed").is_empty());
            assert!(db.update_issue(Uuid::new_v4(), UpdateIssueInput {
                author_id: user.id,
                subject: None,
                status_id: None,
                fixed_version_id: None,
                notes: Some("x".to_string()),
                edited_at: None,
            }).expect("Failed to update").is_none());
        }

        it "selects issues and journals inside the window only" {
            let new = create_status(&db, "New", false, true);
            let user = create_user(&db, "jsmith");
            let other_user = create_user(&db, "dlopper");
            let project = create_project(&db, "ecookbook", None);
            let hidden = create_project(&db, "hidden", None);

            let mut issues = Vec::new();
            for (project, author, ts) in [
                (&project, &user, at(10, 9)),
                (&project, &other_user, at(10, 12)),
                (&project, &user, at(1, 9)),
                (&hidden, &user, at(10, 10)),
            ] {
                issues.push(db.create_issue(project.id, CreateIssueInput {
                    subject: "Work".to_string(),
                    description: None,
                    status_id: Some(new.id),
                    fixed_version_id: None,
                    author_id: author.id,
                    created_at: Some(ts),
                }).expect("Failed to create issue"));
            }
            db.update_issue(issues[2].id, UpdateIssueInput {
                author_id: user.id,
                subject: None,
                status_id: None,
                fixed_version_id: None,
                notes: Some("Reopened".to_string()),
                edited_at: Some(at(10, 15)),
            }).expect("Failed to update");

            let filter = EventFilter {
                project_ids: vec![project.id],
                author_id: None,
                window: window(at(9, 0), at(11, 0)),
            };
            let created: Vec<Uuid> = db.issues_created_in(&filter).expect("Query failed").iter().map(|i| i.id).collect();
            assert_eq!(created, vec![issues[1].id, issues[0].id]);

            let journals = db.journals_in(&filter).expect("Query failed");
            assert_eq!(journals.len(), 1);
            assert_eq!(journals[0].issue.id, issues[2].id);

            let by_author = EventFilter { author_id: Some(user.id), ..filter.clone() };
            let created: Vec<Uuid> = db.issues_created_in(&by_author).expect("Query failed").iter().map(|i| i.id).collect();
            assert_eq!(created, vec![issues[0].id]);

            let nothing = EventFilter { project_ids: Vec::new(), ..filter };
            assert!(db.issues_created_in(&nothing).expect("Query failed").is_empty());
        }
    }

    describe "issue statuses" {
        it "keeps at most one default" {
            let first = create_status(&db, "New", false, true);
            let second = create_status(&db, "Assigned", false, true);

            let statuses = db.issue_statuses().expect("Query failed");
            let defaults: Vec<Uuid> = statuses.iter().filter(|s| s.is_default).map(|s| s.id).collect();
            assert_eq!(defaults, vec![second.id]);
            assert!(statuses.iter().any(|s| s.id == first.id && !s.is_default));
        }

        it "reports statuses in use" {
            let status = create_status(&db, "New", false, true);
            let unused = create_status(&db, "Resolved", false, false);
            let user = create_user(&db, "jsmith");
            let project = create_project(&db, "ecookbook", None);
            create_issue(&db, &project, &user, "Crash");

            assert!(db.issue_status_in_use(status.id).expect("Query failed"));
            assert!(!db.issue_status_in_use(unused.id).expect("Query failed"));
        }

        it "rewrites positions on reorder" {
            let a = create_status(&db, "A", false, false);
            let b = create_status(&db, "B", false, false);
            let c = create_status(&db, "C", false, false);

            db.reorder_issue_statuses(&[c.id, a.id, b.id]).expect("Failed to reorder");

            let order: Vec<(Uuid, i64)> = db.issue_statuses().expect("Query failed").iter().map(|s| (s.id, s.position)).collect();
            assert_eq!(order, vec![(c.id, 1), (a.id, 2), (b.id, 3)]);
        }
    }

    describe "news" {
        it "pages news newest first" {
            let user = create_user(&db, "jsmith");
            let project = create_project(&db, "ecookbook", None);
            for day in 1..=12 {
                db.create_news(project.id, user.id, CreateNewsInput {
                    title: format!("News {}", day),
                    summary: None,
                    description: "Body".to_string(),
                    created_at: Some(at(day, 9)),
                }).expect("Failed to create news");
            }

            let first_page = db.news_of(&[project.id], 10, 0).expect("Query failed");
            let second_page = db.news_of(&[project.id], 10, 10).expect("Query failed");

            assert_eq!(db.count_news(&[project.id]).expect("Query failed"), 12);
            assert_eq!(first_page.len(), 10);
            assert_eq!(first_page[0].title, "News 12");
            assert_eq!(second_page.len(), 2);
            assert_eq!(second_page[1].title, "News 1");
            assert!(db.news_of(&[], 10, 0).expect("Query failed").is_empty());
        }

        it "counts and deletes comments" {
            let user = create_user(&db, "jsmith");
            let project = create_project(&db, "ecookbook", None);
            let news = db.create_news(project.id, user.id, CreateNewsInput {
                title: "Release".to_string(),
                summary: None,
                description: "Body".to_string(),
                created_at: None,
            }).expect("Failed to create news");

            let comment = db.create_comment(news.id, user.id, "Great").expect("Failed to comment");
            db.create_comment(news.id, user.id, "Thanks").expect("Failed to comment");
            assert_eq!(db.find_news(news.id).unwrap().unwrap().comments_count, 2);

            assert!(!db.delete_comment(Uuid::new_v4(), comment.id).expect("Failed to delete"));
            assert!(db.delete_comment(news.id, comment.id).expect("Failed to delete"));
            let remaining = db.comments_of(news.id).expect("Query failed");
            assert_eq!(remaining.len(), 1);
            assert_eq!(remaining[0].content, "Thanks");
        }

        it "edits and deletes news with their comments" {
            let user = create_user(&db, "jsmith");
            let project = create_project(&db, "ecookbook", None);
            let news = db.create_news(project.id, user.id, CreateNewsInput {
                title: "Release".to_string(),
                summary: Some("Short".to_string()),
                description: "Body".to_string(),
                created_at: None,
            }).expect("Failed to create news");
            db.create_comment(news.id, user.id, "Great").expect("Failed to comment");

            let edited = db.update_news(news.id, UpdateNewsInput {
                title: Some("Release 1.0".to_string()),
                ..Default::default()
            }).expect("Failed to update").expect("News should exist");
            assert_eq!(edited.title, "Release 1.0");
            assert_eq!(edited.summary.as_deref(), Some("Short"));
            assert_eq!(db.find_news(news.id).unwrap().unwrap().title, "Release 1.0");
            assert!(db.update_news(Uuid::new_v4(), UpdateNewsInput::default()).expect("Failed to update").is_none());

            assert!(db.delete_news(news.id).expect("Failed to delete"));
            assert!(db.find_news(news.id).expect("Query failed").is_none());
            assert!(db.comments_of(news.id).expect("Query failed").is_empty());
            assert!(!db.delete_news(news.id).expect("Failed to delete"));
        }
    }

    describe "attachments" {
        it "selects attachments by container kind and window" {
            let user = create_user(&db, "jsmith");
            let project = create_project(&db, "ecookbook", None);
            let version = create_version(&db, &project, "1.0", None);

            let attach = |container, ts| {
                db.create_attachment(container, CreateAttachmentInput {
                    filename: "file.zip".to_string(),
                    filesize: 1024,
                    content_type: Some("application/zip".to_string()),
                    author_id: user.id,
                    created_at: Some(ts),
                }).expect("Failed to attach")
            };
            let on_project = attach(AttachmentContainer::project(project.id), at(10, 9));
            let on_version = attach(AttachmentContainer::version(version.id), at(10, 10));
            attach(AttachmentContainer::project(project.id), at(2, 9));

            let found = db.attachments_in(
                &[AttachmentContainer::project(project.id), AttachmentContainer::version(version.id)],
                None,
                &window(at(9, 0), at(11, 0)),
            ).expect("Query failed");
            let ids: Vec<Uuid> = found.iter().map(|a| a.id).collect();
            assert_eq!(ids, vec![on_version.id, on_project.id]);

            // A version id looked up as a project container matches nothing.
            let wrong_kind = db.attachments_in(
                &[AttachmentContainer::project(version.id)],
                None,
                &window(at(1, 0), at(11, 0)),
            ).expect("Query failed");
            assert!(wrong_kind.is_empty());
        }

        it "rejects unknown containers" {
            let user = create_user(&db, "jsmith");
            let result = db.create_attachment(AttachmentContainer::version(Uuid::new_v4()), CreateAttachmentInput {
                filename: "file.zip".to_string(),
                filesize: 1,
                content_type: None,
                author_id: user.id,
                created_at: None,
            });
            assert!(result.unwrap_err().is_not_found());
        }
    }

    describe "file database" {
        it "persists across connections" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("nested").join("trellis.db");

            {
                let file_db = Database::open(path.clone()).expect("Failed to open");
                file_db.migrate().expect("Failed to migrate");
                create_project(&file_db, "ecookbook", None);
            }

            let reopened = Database::open(path).expect("Failed to reopen");
            reopened.migrate().expect("Failed to migrate");
            let projects = reopened.all_projects().expect("Query failed");
            assert_eq!(projects.len(), 1);
            assert!(projects[0].created_at <= Utc::now() + Duration::seconds(1));
        }
    }
}
