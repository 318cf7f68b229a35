use std::path::PathBuf;

use clap::{Parser, Subcommand};
use memberdeck::Config;
use memberdeck::error::AppResult;
use memberdeck::model::entity::{Course, CourseCreate, Lesson, LessonCreate, UserEntity, UserEntityCreateUpdate};
use memberdeck::model::{CrudRepository, DatabaseError, DbConnection, ModelManager};
use memberdeck::services::compensation::{MonthRange, generate};
use memberdeck::services::import::{self, ImportError};
use memberdeck::services::reconcile::reconcile_subscriptions;
use memberdeck::services::{StripeClient, mailer_from_config};
use memberdeck::utils::uploads::normalize_relative;
use memberdeck::web::{AuthenticatedUser, UserRole};

#[derive(Parser, Debug)]
#[command(about = "Operator tool for the memberdeck database", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Manage courses
    Course {
        #[command(subcommand)]
        action: CourseCommands,
    },

    /// Manage lessons
    Lesson {
        #[command(subcommand)]
        action: LessonCommands,
    },

    /// Bulk load records from a CSV file
    Import {
        #[command(subcommand)]
        action: ImportCommands,
    },

    /// Monthly payouts
    Compensation {
        #[command(subcommand)]
        action: CompensationCommands,
    },

    /// Sync local state with the payments vendor
    Reconcile {
        #[command(subcommand)]
        action: ReconcileCommands,
    },
}

fn parse_role(value: &str) -> Result<UserRole, String> {
    UserRole::parse_strict(value).ok_or_else(|| format!("unknown role `{value}`"))
}

/// User management
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "member", value_parser = parse_role)]
        role: UserRole,
    },
}

/// Course management
#[derive(Subcommand, Debug)]
pub enum CourseCommands {
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "member", value_parser = parse_role)]
        required_role: UserRole,
        #[arg(long, default_value_t = 0)]
        order_index: i32,
    },
}

/// Lesson management
#[derive(Subcommand, Debug)]
pub enum LessonCommands {
    Add {
        /// Course title to attach the lesson to
        #[arg(long)]
        course_title: String,
        #[arg(long)]
        title: String,
        /// Path to a Markdown file with lesson content
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        video_url: Option<String>,
        /// Material path relative to the uploads directory
        #[arg(long)]
        material_path: Option<String>,
        #[arg(long, default_value_t = 0)]
        order_index: i32,
    },
}

#[derive(Subcommand, Debug)]
pub enum ImportCommands {
    /// `email,display_name,role[,referral_code]`
    Users { file: PathBuf },
    /// `fp_email,customer_name,amount,contracted_on`
    Contracts { file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum CompensationCommands {
    Generate {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReconcileCommands {
    Subscriptions,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    let config = Config::get_or_init(false).await;
    let database_uri = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| config.app().database_uri().to_string());
    let db_con = DbConnection::connect(&database_uri)?;
    let mm = ModelManager::new(db_con);
    let actor = AuthenticatedUser::admin();

    match args.command {
        Commands::User { action } => match action {
            UserCommands::Add { email, display_name, password, role } => {
                let user = UserEntity::create(
                    &mm,
                    &actor,
                    UserEntityCreateUpdate {
                        email,
                        display_name,
                        password_hash: memberdeck::auth::hash_password(&password)?,
                        role,
                        referred_by: None,
                    },
                )
                .await?;
                println!("User created: {} ({}, {})", user.email(), user.id(), user.role());
            }
        },

        Commands::Course { action } => match action {
            CourseCommands::Add { title, description, required_role, order_index } => {
                let course = Course::create(
                    &mm,
                    &actor,
                    CourseCreate {
                        title,
                        description,
                        required_role: Some(required_role),
                        published: Some(true),
                        order_index: Some(order_index),
                    },
                )
                .await?;
                println!("Course created: {} ({})", course.title(), course.id());
            }
        },

        Commands::Lesson { action } => match action {
            LessonCommands::Add { course_title, title, file, video_url, material_path, order_index } => {
                let course_id: uuid::Uuid = sqlx::query_scalar("SELECT id FROM courses WHERE title = $1")
                    .bind(&course_title)
                    .fetch_one(mm.executor())
                    .await
                    .map_err(DatabaseError::SqlxError)?;

                let material_path = material_path
                    .map(|raw| {
                        normalize_relative(&raw).ok_or_else(|| {
                            std::io::Error::new(std::io::ErrorKind::InvalidInput, "material path must be relative")
                        })
                    })
                    .transpose()?;
                let content = std::fs::read_to_string(file)?;
                let lesson = Lesson::create(
                    &mm,
                    &actor,
                    LessonCreate {
                        course_id,
                        title,
                        content,
                        video_url,
                        material_path,
                        order_index: Some(order_index),
                    },
                )
                .await?;
                println!("Lesson created: {} ({})", lesson.title(), lesson.id());
            }
        },

        Commands::Import { action } => {
            let mailer = mailer_from_config(config.mail());
            let summary = match action {
                ImportCommands::Users { file } => {
                    let text = std::fs::read_to_string(file)?;
                    let rows = import::parse_users(&text).map_err(ImportError::Rejected)?;
                    import::import_users(&mm, mailer.as_ref(), config.host().public_url(), rows).await?
                }
                ImportCommands::Contracts { file } => {
                    let text = std::fs::read_to_string(file)?;
                    let rows = import::parse_contracts(&text).map_err(ImportError::Rejected)?;
                    import::import_contracts(&mm, rows).await?
                }
            };
            println!("Imported: {}", summary.imported);
            for skipped in &summary.skipped {
                println!("Skipped {skipped}");
            }
        }

        Commands::Compensation { action } => match action {
            CompensationCommands::Generate { year, month } => {
                let range = MonthRange::new(year, month)?;
                let summary = generate(&mm, range, config.compensation()).await?;
                println!(
                    "Compensations for {}: {} written, {} already paid, {} pruned",
                    summary.period_start, summary.written, summary.skipped_paid, summary.pruned
                );
            }
        },

        Commands::Reconcile { action } => match action {
            ReconcileCommands::Subscriptions => {
                let stripe = StripeClient::from_config(config.stripe());
                let summary = reconcile_subscriptions(&mm, &stripe).await?;
                println!(
                    "Subscriptions: {} checked, {} updated, {} failed",
                    summary.checked, summary.updated, summary.failed
                );
            }
        },
    }

    Ok(())
}
