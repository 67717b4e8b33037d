use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trellis::activity::ActivityFeed;
use trellis::authz::MembershipAuthorizer;
use trellis::cli::{self as output, tree_render};
use trellis::config::{parse_utc_offset, Config};
use trellis::db::Database;
use trellis::files::FilesService;
use trellis::models::*;
use trellis::news::NewsService;
use trellis::roadmap::{Roadmap, RoadmapQuery};
use trellis::tree::ProjectTree;
use trellis::visibility::Visibility;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Project hierarchy, visibility and activity feed for project tracking")]
struct Cli {
    /// SQLite database file (overrides TRELLIS_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Login of the user to act as. Anonymous when omitted.
    #[arg(long = "as", global = true)]
    login: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Migrate,
    /// Show the project tree
    Tree {
        /// Include archived and private projects (administrators only)
        #[arg(long)]
        all: bool,
    },
    /// Show the breadcrumb trail of a project
    Ancestors {
        /// Project id or identifier
        project: String,
    },
    /// Show the activity feed
    Activity {
        /// Restrict to one project (id or identifier)
        #[arg(short, long, conflicts_with = "user")]
        project: Option<String>,

        /// Include subprojects of --project
        #[arg(long, requires = "project")]
        with_subprojects: bool,

        /// Restrict to events caused by this login
        #[arg(short, long)]
        user: Option<String>,

        /// First day (YYYY-MM-DD), inclusive
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day (YYYY-MM-DD), inclusive
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Event kinds to include: issue, issue-edit, news, file. Repeatable.
        #[arg(short, long = "kind")]
        kinds: Vec<String>,

        /// Days to look back when --from is not given
        #[arg(long)]
        days: Option<u32>,

        /// Offset used to group events by day, e.g. +02:00
        #[arg(long)]
        utc_offset: Option<String>,
    },
    /// Show the roadmap of a project
    Roadmap {
        /// Project id or identifier
        project: String,

        #[arg(long)]
        with_subprojects: bool,

        /// Also list completed versions
        #[arg(long)]
        completed: bool,

        /// Reference day for completion (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// List news
    News {
        /// Restrict to one project (id or identifier)
        #[arg(short, long)]
        project: Option<String>,

        #[arg(long, default_value = "1")]
        page: u32,
    },
    /// List the files of a project
    Files {
        /// Project id or identifier
        project: String,
    },
    /// Archive a project and its subprojects
    Archive { project: String },
    /// Reactivate an archived project
    Unarchive { project: String },
    /// Move a project under another one
    Move {
        /// Project id or identifier
        project: String,

        /// New parent (id or identifier)
        #[arg(long, conflicts_with = "root", required_unless_present = "root")]
        parent: Option<String>,

        /// Make it a top-level project
        #[arg(long)]
        root: bool,
    },
}

/// Initialize tracing on stderr so stdout stays clean for --json output
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "trellis=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::from_env();
    if let Some(path) = cli.database.clone() {
        config.database_path = Some(path);
    }

    let db = Database::from_config(&config)?;
    db.migrate()?;
    if matches!(cli.command, Commands::Migrate) {
        tracing::info!("Database is up to date");
        return Ok(());
    }

    let actor = match &cli.login {
        Some(login) => Actor::user(
            db.find_user_by_login(login)?
                .with_context(|| format!("Unknown user '{}'", login))?,
        ),
        None => Actor::anonymous(),
    };

    let tree = ProjectTree::new(&db);
    let authz = MembershipAuthorizer::new(&tree);
    let visibility = Visibility::new(&tree, &authz);

    match cli.command {
        Commands::Migrate => {}
        Commands::Tree { all } => {
            let nodes = if all {
                anyhow::ensure!(actor.is_admin(), "--all is reserved to administrators");
                tree.forest()?.nodes()
            } else {
                visibility.visible_tree(&actor)?
            };
            emit(cli.json, &nodes, || tree_render::render_tree(&nodes))?;
        }
        Commands::Ancestors { project } => {
            let project = visibility.find_visible(&actor, &project.parse()?)?;
            let trail = visibility.breadcrumbs(&actor, project.id)?;
            emit(cli.json, &trail, || output::render_breadcrumbs(&trail, &project))?;
        }
        Commands::Activity {
            project,
            with_subprojects,
            user,
            from,
            to,
            kinds,
            days,
            utc_offset,
        } => {
            let time_zone = match utc_offset {
                Some(s) => parse_utc_offset(&s)
                    .with_context(|| format!("Invalid UTC offset '{}'", s))?,
                None => config.time_zone,
            };
            let kinds = kinds
                .iter()
                .map(|k| EventKind::from_str(k).with_context(|| format!("Unknown kind '{}'", k)))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let scope = match (project, user) {
                (Some(project), _) => ActivityScope::Project {
                    project: project.parse()?,
                    with_subprojects,
                },
                (None, Some(login)) => ActivityScope::User {
                    user_id: db
                        .find_user_by_login(&login)?
                        .with_context(|| format!("Unknown user '{}'", login))?
                        .id,
                },
                (None, None) => ActivityScope::Global,
            };

            let range = DateRange {
                from: from.map(|d| day_start(d, time_zone)).transpose()?,
                to: to.map(|d| day_end(d, time_zone)).transpose()?,
            };
            let query = ActivityQuery::new(scope)
                .with_range(range)
                .with_kinds(kinds)
                .with_time_zone(time_zone);

            let activity = ActivityFeed::new(&visibility)
                .with_lookback_days(days.unwrap_or(config.activity_days))
                .collect(&actor, &query)?;
            emit(cli.json, &activity, || output::render_activity(&activity, time_zone))?;
        }
        Commands::Roadmap {
            project,
            with_subprojects,
            completed,
            as_of,
        } => {
            let query = RoadmapQuery {
                include_subprojects: with_subprojects,
                include_completed: completed,
                as_of: as_of.unwrap_or_else(|| Utc::now().date_naive()),
            };
            let entries = Roadmap::new(&visibility).roadmap(&actor, &project.parse()?, &query)?;
            emit(cli.json, &entries, || output::render_roadmap(&entries))?;
        }
        Commands::News { project, page } => {
            let project = project.map(|p| p.parse::<ProjectRef>()).transpose()?;
            let news = NewsService::new(&visibility).list(&actor, project.as_ref(), page)?;
            emit(cli.json, &news, || output::render_news(&news))?;
        }
        Commands::Files { project } => {
            let files = FilesService::new(&visibility).list(&actor, &project.parse()?)?;
            emit(cli.json, &files, || output::render_files(&files))?;
        }
        Commands::Archive { project } => {
            let project = tree.find(&project.parse()?)?;
            let changed = tree.archive(&actor, project.id)?;
            println!("Archived {} project(s)", changed);
        }
        Commands::Unarchive { project } => {
            let project = tree.find(&project.parse()?)?;
            tree.unarchive(&actor, project.id)?;
            println!("Unarchived {}", project.identifier);
        }
        Commands::Move {
            project,
            parent,
            root: _,
        } => {
            let project = tree.find(&project.parse()?)?;
            let parent = match parent {
                Some(parent) => Some(tree.find(&parent.parse()?)?.id),
                None => None,
            };
            let moved = tree.set_parent(&authz, &actor, project.id, parent)?;
            emit(cli.json, &moved, || format!("Moved {}\n", moved.identifier))?;
        }
    }

    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text());
    }
    Ok(())
}

fn day_start(day: NaiveDate, time_zone: FixedOffset) -> anyhow::Result<DateTime<Utc>> {
    at_time(day, NaiveTime::MIN, time_zone)
}

fn day_end(day: NaiveDate, time_zone: FixedOffset) -> anyhow::Result<DateTime<Utc>> {
    let end = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
        .context("Invalid end of day")?;
    at_time(day, end, time_zone)
}

fn at_time(day: NaiveDate, time: NaiveTime, time_zone: FixedOffset) -> anyhow::Result<DateTime<Utc>> {
    day.and_time(time)
        .and_local_timezone(time_zone)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid date {}", day))
}
