use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};

use kupuna_intake::analytics::{garden_report, get_exercise_adherence};
use kupuna_intake::config::Config;
use kupuna_intake::db::SqliteStorage;
use kupuna_intake::domain::{NewExercise, SessionEvent};
use kupuna_intake::logging;
use kupuna_intake::pipeline::impute::{ImputationPolicy, ImputationScope};
use kupuna_intake::pipeline::project::to_table;
use kupuna_intake::pipeline::{write_table, JoinPolicy, ReconciliationPipeline};
use kupuna_intake::storage::Storage;

const DEMO_MEMBERS: &str = include_str!("../demos/members.csv");
const DEMO_ENROLLMENT: &str = include_str!("../demos/enrollment.csv");

#[derive(Parser)]
#[command(name = "kupuna")]
#[command(about = "Kūpuna member intake and exercise adherence")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a member roster with an enrollment extract and store the patients
    Intake {
        /// Member roster CSV (built-in demo extract when omitted)
        #[arg(long)]
        members: Option<PathBuf>,
        /// Enrollment CSV (built-in demo extract when omitted)
        #[arg(long)]
        enrollment: Option<PathBuf>,
        /// single-key or two-stage
        #[arg(long)]
        join_policy: Option<JoinPolicy>,
        /// fill-missing or always-reroll
        #[arg(long)]
        imputation_policy: Option<ImputationPolicy>,
        /// per-key or per-row
        #[arg(long)]
        imputation_scope: Option<ImputationScope>,
        /// Seed for reproducible imputation
        #[arg(long)]
        seed: Option<u64>,
        /// Write the reconciled patient table to this CSV file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Reconcile without writing to the database
        #[arg(long)]
        dry_run: bool,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored patients
    Patients,
    /// List exercises
    Exercises,
    /// Add an exercise
    AddExercise {
        #[arg(long)]
        name: String,
        /// warm-up, main or cool-down
        #[arg(long)]
        phase: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        video: Option<String>,
    },
    /// List routines with their exercises
    Routines,
    /// Create a routine from existing exercises
    CreateRoutine {
        #[arg(long)]
        name: String,
        #[arg(long)]
        music: Option<String>,
        /// Exercise ids in routine order (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exercises: Vec<i64>,
    },
    /// Assign a routine to a patient
    Assign {
        #[arg(long)]
        patient: i64,
        #[arg(long)]
        routine: i64,
    },
    /// Record a completed session
    LogSession {
        #[arg(long)]
        patient: i64,
        #[arg(long)]
        routine: i64,
        /// Session day (YYYY-MM-DD); now when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show total sessions and longest streak for a patient's routine
    Adherence {
        #[arg(long)]
        patient: i64,
        #[arg(long)]
        routine: i64,
    },
    /// Show every assignment with its adherence
    Garden,
}

fn read_extract(path: Option<&PathBuf>, demo: &'static str) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display())),
        None => Ok(demo.to_string()),
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Intake {
            members,
            enrollment,
            join_policy,
            imputation_policy,
            imputation_scope,
            seed,
            output,
            dry_run,
            json,
        } => {
            info!("🔄 Running member intake");
            if let Some(policy) = join_policy {
                config.pipeline.join_policy = policy;
            }
            if let Some(policy) = imputation_policy {
                config.pipeline.imputation_policy = policy;
            }
            if let Some(scope) = imputation_scope {
                config.pipeline.imputation_scope = scope;
            }
            if seed.is_some() {
                config.pipeline.seed = seed;
            }

            let roster_text = read_extract(members.as_ref(), DEMO_MEMBERS)?;
            let enrollment_text = read_extract(enrollment.as_ref(), DEMO_ENROLLMENT)?;

            let pipeline = ReconciliationPipeline::new(config.reference_tables(), config.pipeline.clone())?;
            let mut rng = pipeline.rng();
            let outcome = if dry_run {
                pipeline.run(&roster_text, &enrollment_text, &mut rng)
            } else {
                let storage = SqliteStorage::open(&config.storage.database_path)?;
                pipeline.run_and_persist(&roster_text, &enrollment_text, &storage, &mut rng)
            };

            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    error!("Intake failed: {}", e);
                    println!("❌ Intake failed: {}", e);
                    return Err(e.into());
                }
            };

            if let Some(path) = &output {
                let text = write_table(&to_table(&result.patients))?;
                fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote patient table to {}", path.display());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!("\n📊 Intake Results (run {}):", result.run_id);
            println!("   Roster rows: {}", result.roster_rows);
            println!("   Enrollment rows: {}", result.enrollment_rows);
            println!("   Duplicates dropped: {}", result.duplicates_dropped);
            println!("   Joined rows: {}", result.joined_rows);
            println!("   Races imputed: {}", result.imputation.imputed);
            println!("   Default names: {}", result.default_names);
            if dry_run {
                println!("   Persisted: (dry run)");
            } else {
                println!("   Persisted: {}", result.persisted);
            }

            if let Some(path) = &output {
                println!("   Output file: {}", path.display());
            }
            println!("✅ Intake completed");
        }
        Commands::Patients => {
            let storage = SqliteStorage::open(&config.storage.database_path)?;
            let patients = storage.fetch_patients()?;
            if patients.is_empty() {
                println!("No patients yet. Run `kupuna intake` first.");
            }
            for p in patients {
                let age = p.age.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string());
                let gender = p.gender.as_deref().unwrap_or("-");
                println!(
                    "{:>4}  {:<24} age {:>3}  {}  {} (ethnicity {})",
                    p.id, p.name, age, gender, p.race, p.ethnicity
                );
            }
        }
        Commands::Exercises => {
            let storage = SqliteStorage::open(&config.storage.database_path)?;
            for e in storage.fetch_all_exercises()? {
                println!("{:>4}  [{}] {}: {}", e.id, e.phase, e.name, e.description);
            }
        }
        Commands::AddExercise {
            name,
            phase,
            description,
            video,
        } => {
            let storage = SqliteStorage::open(&config.storage.database_path)?;
            let id = storage.insert_exercise(&NewExercise {
                name: name.clone(),
                phase,
                description,
                video,
            })?;
            println!("✅ Created exercise '{}' with id {}", name, id);
        }
        Commands::Routines => {
            let storage = SqliteStorage::open(&config.storage.database_path)?;
            for routine in storage.fetch_routines()? {
                match &routine.music {
                    Some(music) => println!("🎵 {:>4}  {} ({})", routine.id, routine.name, music),
                    None => println!("   {:>4}  {}", routine.id, routine.name),
                }
                for (i, e) in storage.fetch_routine_exercises(routine.id)?.iter().enumerate() {
                    println!("         {}. [{}] {}", i + 1, e.phase, e.name);
                }
            }
        }
        Commands::CreateRoutine { name, music, exercises } => {
            if name.trim().is_empty() {
                bail!("Routine name must not be empty");
            }
            let storage = SqliteStorage::open(&config.storage.database_path)?;
            let id = storage.insert_routine(&name, music.as_deref(), &exercises)?;
            println!("✅ Created routine '{}' with id {} ({} exercises)", name, id, exercises.len());
        }
        Commands::Assign { patient, routine } => {
            let storage = SqliteStorage::open(&config.storage.database_path)?;
            storage.assign_routine(patient, routine)?;
            println!("✅ Assigned routine {} to patient {}", routine, patient);
        }
        Commands::LogSession { patient, routine, date } => {
            let completed_at = match date {
                Some(day) => {
                    let noon = day.and_hms_opt(12, 0, 0).context("Invalid session time")?;
                    Utc.from_utc_datetime(&noon)
                }
                None => Utc::now(),
            };
            let storage = SqliteStorage::open(&config.storage.database_path)?;
            storage.insert_session_event(&SessionEvent {
                patient_id: patient,
                routine_id: routine,
                completed_at,
            })?;
            println!("✅ Logged session for patient {} on {}", patient, completed_at.date_naive());
        }
        Commands::Adherence { patient, routine } => {
            let storage = SqliteStorage::open(&config.storage.database_path)?;
            let summary = get_exercise_adherence(&storage, patient, routine)?;
            println!("\n📊 Adherence for patient {} / routine {}:", patient, routine);
            println!("   Total sessions: {}", summary.total_sessions);
            println!("   Longest streak: {} days", summary.longest_streak);
        }
        Commands::Garden => {
            let storage = SqliteStorage::open(&config.storage.database_path)?;
            let entries = garden_report(&storage)?;
            if entries.is_empty() {
                println!("🌱 The garden is empty. Assign a routine to get started.");
            }
            for entry in entries {
                let flowers = "🌸".repeat(entry.adherence.longest_streak.min(10) as usize);
                println!(
                    "🌱 {} / {}: {} sessions, best streak {} {}",
                    entry.assignment.patient_name,
                    entry.assignment.routine_name,
                    entry.adherence.total_sessions,
                    entry.adherence.longest_streak,
                    flowers
                );
            }
        }
    }

    Ok(())
}
