use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use rafflrs::config::{self, FraudConfig};
use rafflrs::core::hash::compute_hashes;
use rafflrs::core::randomizer::{select_winner, verify_selection, SeedMaterial};
use rafflrs::core::scoring::{RiskAssessment, RiskLevel};
use rafflrs::core::submission::{Identity, NewSubmission, SubmissionId};
use rafflrs::database::models::{ReviewStatus, SubmissionFilter, SubmissionRecord};
use rafflrs::database::repositories::{DrawRepository, SubmissionRepository};
use rafflrs::database::Database;
use rafflrs::services::{AuditService, RegistrationService};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "rafflrs",
    version,
    about = "Anti-fraud screening and verifiable winner draws for promo campaigns"
)]
struct Cli {
    /// SQLite database (default: `<data dir>/rafflrs/rafflrs.db`)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Fraud policy JSON (default: `<data dir>/rafflrs/config.json`, if present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the exact and perceptual hash of a photo
    Hash {
        #[arg(value_name = "PHOTO")]
        path: PathBuf,
    },

    /// Screen and store a new submission
    Register {
        /// Telegram user id of the participant
        #[arg(long)]
        identity: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        campaign: String,
        #[arg(long, value_name = "PHOTO")]
        photo: PathBuf,
        /// Submission time, RFC 3339 (default: now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Show the assessment without storing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect stored submissions
    Submissions {
        #[command(subcommand)]
        command: SubmissionsCmd,
    },

    /// Set the review status of a submission
    Review {
        id: i64,
        #[arg(value_enum)]
        status: StatusArg,
        #[arg(long)]
        note: Option<String>,
    },

    /// Recompute a stored assessment under the current policy
    Rescore {
        id: i64,
        /// Recorded in the audit trail
        #[arg(long)]
        reason: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Draw a winner among approved submissions
    Draw {
        #[arg(long)]
        campaign: Option<String>,
        /// Hash of a public blockchain block to seed the draw
        #[arg(long, conflicts_with = "seed")]
        block_hash: Option<String>,
        /// Administrator-supplied seed
        #[arg(long, conflicts_with = "block_hash")]
        seed: Option<String>,
        /// Compute the winner without recording the draw
        #[arg(long)]
        dry_run: bool,
    },

    /// Recompute a recorded draw from its disclosed seed and entries
    Verify {
        #[arg(value_name = "DRAW_ID")]
        draw: String,
    },

    /// Find duplicate photos in a directory
    Audit {
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// Summary counts of the store
    Stats,
}

#[derive(Subcommand, Debug)]
enum SubmissionsCmd {
    /// List submissions, optionally filtered
    List {
        #[arg(long)]
        level: Option<RiskLevel>,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[arg(long)]
        campaign: Option<String>,
    },

    /// Show one submission with its risk details and re-assessments
    Show { id: i64 },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatusArg {
    Pending,
    Approved,
    Rejected,
    Blocked,
}

impl From<StatusArg> for ReviewStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Pending => ReviewStatus::Pending,
            StatusArg::Approved => ReviewStatus::Approved,
            StatusArg::Rejected => ReviewStatus::Rejected,
            StatusArg::Blocked => ReviewStatus::Blocked,
        }
    }
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Hash { path } => {
            let bytes = read_photo(&path)?;
            let hashes = compute_hashes(&bytes)
                .with_context(|| format!("Failed to hash {}", path.display()))?;
            println!("▶ {}", path.display());
            println!("   sha256: {}", hashes.exact);
            match hashes.perceptual {
                Some(phash) => println!("   phash:  {}", phash.to_hex()),
                None => println!("   phash:  (unavailable)"),
            }
        }

        Commands::Register {
            identity,
            name,
            phone,
            username,
            campaign,
            photo,
            at,
            dry_run,
        } => {
            let policy = load_policy(cli.config.as_deref())?;
            let db = open_database(cli.db.as_deref())?;
            let service = RegistrationService::new(&db, &policy)?;

            let bytes = read_photo(&photo)?;
            let submission = NewSubmission {
                identity: Identity::new(identity),
                name,
                phone_number: phone,
                username,
                campaign,
                photo_path: photo.to_string_lossy().into_owned(),
                submitted_at: at.unwrap_or_else(Utc::now),
            };

            if dry_run {
                let screening = service.preview(&submission, &bytes)?;
                println!("▶ [dry-run] Screening of {}", submission.identity);
                print_assessment(&screening.assessment);
                println!("\n⚠️  Dry-run only; nothing was stored.");
            } else {
                let record = service.register(&submission, &bytes)?;
                println!("✅ Stored submission #{}", record.id);
                if let Some(stored) = &record.assessment {
                    print_assessment(&stored.assessment);
                }
            }
        }

        Commands::Submissions { command } => {
            let db = open_database(cli.db.as_deref())?;
            let repo = SubmissionRepository::new(&db);
            match command {
                SubmissionsCmd::List {
                    level,
                    status,
                    campaign,
                } => {
                    let filter = SubmissionFilter {
                        level,
                        status: status.map(ReviewStatus::from),
                        campaign,
                    };
                    let records = repo.list(&filter)?;
                    if records.is_empty() {
                        println!("No submissions found.");
                    }
                    for record in &records {
                        println!("{}", summary_line(record));
                    }
                }

                SubmissionsCmd::Show { id } => {
                    let record = repo.find_by_id(SubmissionId(id))?;
                    println!("{}", summary_line(&record));
                    println!("   name:     {}", record.name);
                    println!("   phone:    {}", record.phone_number);
                    if let Some(username) = &record.username {
                        println!("   username: {}", username);
                    }
                    println!("   photo:    {}", record.photo_path);
                    println!("   sha256:   {}", record.hashes.exact);
                    if let Some(note) = &record.review_note {
                        println!("   note:     {}", note);
                    }
                    match &record.assessment {
                        Some(stored) => {
                            println!("   assessed: {}", stored.assessed_at.to_rfc3339());
                            print_assessment(&stored.assessment);
                        }
                        None => println!("   ⚠️  Not assessed"),
                    }
                    for audit in repo.reassessments(record.id)? {
                        println!(
                            "   🔄 {} {} {} → {} {} ({})",
                            audit.reassessed_at.to_rfc3339(),
                            audit.previous_score,
                            audit.previous_level,
                            audit.new_score,
                            audit.new_level,
                            audit.reason
                        );
                    }
                }
            }
        }

        Commands::Review { id, status, note } => {
            let db = open_database(cli.db.as_deref())?;
            let record = SubmissionRepository::new(&db).set_review(
                SubmissionId(id),
                status.into(),
                note.as_deref(),
            )?;
            println!("✅ {}", summary_line(&record));
        }

        Commands::Rescore { id, reason, yes } => {
            let policy = load_policy(cli.config.as_deref())?;
            let db = open_database(cli.db.as_deref())?;
            let id = SubmissionId(id);
            let record = SubmissionRepository::new(&db).find_by_id(id)?;

            if !yes {
                let proceed = Confirm::new()
                    .with_prompt(format!(
                        "Replace the assessment of submission #{} ({})?",
                        id, reason
                    ))
                    .default(false)
                    .interact()?;
                if !proceed {
                    println!("Aborted.");
                    return Ok(());
                }
            }

            let bytes = read_photo(Path::new(&record.photo_path))?;
            let service = RegistrationService::new(&db, &policy)?;
            let (screening, audit) = service.rescore(id, &bytes, &reason)?;
            println!(
                "🔄 Submission #{}: {} {} → {} {}",
                id, audit.previous_score, audit.previous_level, audit.new_score, audit.new_level
            );
            print_assessment(&screening.assessment);
        }

        Commands::Draw {
            campaign,
            block_hash,
            seed,
            dry_run,
        } => {
            let db = open_database(cli.db.as_deref())?;
            let entries = SubmissionRepository::new(&db).eligible_entries(campaign.as_deref())?;
            let seed = match (block_hash, seed) {
                (Some(hash), _) => SeedMaterial::block_hash(hash),
                (None, Some(nonce)) => SeedMaterial::nonce(nonce),
                (None, None) => SeedMaterial::from_timestamp(Utc::now()),
            };
            println!(
                "▶ Drawing among {} eligible submission(s), seed {} '{}'",
                entries.len(),
                seed.source,
                seed.value
            );

            let selection = select_winner(&entries, &seed).context("Draw failed")?;
            if dry_run {
                println!(
                    "   🏆 [dry-run] Winner → #{} ({}), index {} of {}",
                    selection.winner.id,
                    selection.winner.identity,
                    selection.index,
                    selection.eligible_count
                );
                println!("   digest: {}", selection.digest);
                return Ok(());
            }

            let record = DrawRepository::new(&db).record(campaign.as_deref(), &selection)?;
            log::info!(
                "LOTTERY_DRAW draw={} seed_source={} seed={} digest={} eligible={} index={} winner={}",
                record.id,
                selection.seed.source,
                selection.seed.value,
                selection.digest,
                selection.eligible_count,
                selection.index,
                selection.winner.id
            );
            println!(
                "   🏆 Winner → #{} ({}), index {} of {}",
                selection.winner.id,
                selection.winner.identity,
                selection.index,
                selection.eligible_count
            );
            println!("   digest: {}", selection.digest);
            println!("\n✅ Recorded draw {}", record.id);
        }

        Commands::Verify { draw } => {
            let db = open_database(cli.db.as_deref())?;
            let record = DrawRepository::new(&db).find_by_id(&draw)?;
            let selection = &record.selection;
            println!(
                "▶ Draw {} ({}), seed {} '{}'",
                record.id,
                record.drawn_at.to_rfc3339(),
                selection.seed.source,
                selection.seed.value
            );
            if !verify_selection(&selection.entries, selection) {
                anyhow::bail!("Draw {} does not reproduce from its seed and entries", record.id);
            }
            println!(
                "✅ Reproduced winner #{} at index {} of {} (digest {})",
                selection.winner.id, selection.index, selection.eligible_count, selection.digest
            );
        }

        Commands::Audit { path } => {
            let policy = load_policy(cli.config.as_deref())?;
            println!("▶ Auditing photos in: {}", path.display());

            let service = AuditService::new(policy.near_match_threshold);
            let total = service.find_photos(&path)?.len();
            let bar = ProgressBar::new(total as u64);
            bar.set_style(ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )?);
            bar.set_message("hashing");

            let progress = bar.clone();
            let service = service.with_progress(Box::new(move |done| progress.inc(done as u64)));
            let report = benchmark("hashing all photos", || service.scan(&path))?;
            bar.finish_with_message("done");

            println!("Scanned {} photo(s).", report.photos_scanned);
            if report.exact_groups.is_empty() && report.near_pairs.is_empty() {
                println!("No duplicates found.");
            }
            for (i, group) in report.exact_groups.iter().enumerate() {
                println!("\n✨ Identical group {}:", i + 1);
                for file in group {
                    println!("   ▶ {}", file.display());
                }
            }
            for pair in &report.near_pairs {
                println!(
                    "\n🔍 Near duplicate (distance {}):\n   ▶ {}\n   ▶ {}",
                    pair.distance,
                    pair.first.display(),
                    pair.second.display()
                );
            }
            for (file, reason) in &report.unreadable {
                eprintln!("⚠️  Skipped {}: {}", file.display(), reason);
            }
        }

        Commands::Stats => {
            let db = open_database(cli.db.as_deref())?;
            let stats = SubmissionRepository::new(&db).stats()?;
            println!("🗂️  Submissions: {}", stats.total);
            println!("   unassessed:    {}", stats.unassessed);
            println!("   manual review: {}", stats.manual_review);
            println!("   winners:       {}", stats.winners);
            for (level, count) in &stats.by_level {
                println!("   level {:<8} {}", level, count);
            }
            for (status, count) in &stats.by_status {
                println!("   status {:<8} {}", status, count);
            }
        }
    }

    Ok(())
}

fn load_policy(path: Option<&Path>) -> Result<FraudConfig> {
    match path {
        Some(path) => FraudConfig::load(path)
            .with_context(|| format!("Failed to load policy {}", path.display())),
        None => {
            let path = config::default_config_path()?;
            FraudConfig::load_or_default(&path)
                .with_context(|| format!("Failed to load policy {}", path.display()))
        }
    }
}

fn open_database(path: Option<&Path>) -> Result<Database> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::default_database_path()?,
    };
    Database::open(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn read_photo(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read photo {}", path.display()))
}

fn summary_line(record: &SubmissionRecord) -> String {
    let risk = match &record.assessment {
        Some(stored) => format!(
            "{:>3} {:<6}",
            stored.assessment.score, stored.assessment.level
        ),
        None => "  - -     ".to_string(),
    };
    format!(
        "#{:<5} {} {:<9} {} {}{}",
        record.id,
        risk,
        record.review_status,
        record.identity,
        record.campaign,
        if record.is_winner { " 🏆" } else { "" }
    )
}

fn print_assessment(assessment: &RiskAssessment) {
    println!("   risk: {} ({})", assessment.score, assessment.level);
    for detail in &assessment.details {
        println!("   • {:<18} +{:<3} {}", detail.signal, detail.points, detail.note);
    }
    if assessment.manual_review_required {
        println!("   ⚠️  Manual review required");
    }
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
