use pillbox_core::scan::{check_image, PROCESS_FAILED};
use pillbox_core::*;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pillbox")]
#[command(about = "Medication schedule and adherence tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Email of the account to act as
    #[arg(long, global = true)]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and print its share code
    Signup {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        /// patient or caregiver
        #[arg(long, default_value = "patient")]
        role: String,
    },

    /// Add a medication with its daily schedule
    Add {
        #[command(flatten)]
        form: MedicationForm,
    },

    /// Update a medication and replace its schedule
    Edit {
        id: Uuid,

        #[command(flatten)]
        form: MedicationForm,
    },

    /// Delete a medication with its schedule and logs
    Remove { id: Uuid },

    /// Show today's doses and completion
    Today {
        #[arg(long)]
        json: bool,
    },

    /// Mark a dose as taken
    Take { log_id: Uuid },

    /// Mark a dose as not taken yet
    Untake { log_id: Uuid },

    /// Link to a patient using their share code
    Link { code: String },

    /// Show today's completion for every linked patient
    Patients {
        #[arg(long)]
        json: bool,
    },

    /// Read a medicine label image; with --time, save it as a medication
    Scan {
        #[arg(long)]
        image: PathBuf,

        /// morning, afternoon or evening (repeatable)
        #[arg(long = "time")]
        times: Vec<String>,
    },

    /// Delete the acting account and everything it owns
    DeleteAccount,
}

#[derive(clap::Args)]
struct MedicationForm {
    #[arg(long)]
    name: String,

    #[arg(long)]
    dosage: Option<String>,

    #[arg(long)]
    instructions: Option<String>,

    /// morning, afternoon or evening (repeatable)
    #[arg(long = "time")]
    times: Vec<String>,
}

impl MedicationForm {
    fn into_input(self) -> MedicationInput {
        MedicationInput {
            name: self.name,
            dosage: self.dosage,
            instructions: self.instructions,
            schedules: self.times,
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    pillbox_core::logging::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());

    let tracker = Tracker::new(FileStore::in_dir(&data_dir))
        .with_share_code_attempts(config.share_code.max_attempts);

    let current_user = || acting_user(&tracker, cli.user.as_deref());

    match cli.command {
        Commands::Signup { name, email, role } => cmd_signup(&tracker, name, email, role),
        Commands::Add { form } => {
            let user = current_user()?;
            let view = tracker.add_medication(user.id, &form.into_input())?;
            print_saved(&view);
            Ok(())
        }
        Commands::Edit { id, form } => {
            let user = current_user()?;
            let view = tracker.update_medication(user.id, id, &form.into_input())?;
            print_saved(&view);
            Ok(())
        }
        Commands::Remove { id } => {
            tracker.remove_medication(current_user()?.id, id)?;
            println!("✓ Medication deleted");
            Ok(())
        }
        Commands::Today { json } => cmd_today(&tracker, &current_user()?, json),
        Commands::Take { log_id } => {
            let log = tracker.mark_taken(current_user()?.id, log_id)?;
            println!("✓ Marked as taken");
            tracing::debug!("Log {} is now {:?}", log.id, log.status);
            Ok(())
        }
        Commands::Untake { log_id } => {
            let log = tracker.mark_pending(current_user()?.id, log_id)?;
            println!("✓ Marked as pending");
            tracing::debug!("Log {} is now {:?}", log.id, log.status);
            Ok(())
        }
        Commands::Link { code } => {
            let patient = tracker.link_patient(current_user()?.id, &code)?;
            println!("✓ Linked to {}", patient.name);
            Ok(())
        }
        Commands::Patients { json } => cmd_patients(&tracker, &current_user()?, json),
        Commands::Scan { image, times } => {
            cmd_scan(&tracker, &current_user()?, &config, image, times)
        }
        Commands::DeleteAccount => {
            tracker.delete_account(current_user()?.id)?;
            println!("✓ Account deleted");
            Ok(())
        }
    }
}

fn acting_user(tracker: &Tracker<FileStore>, email: Option<&str>) -> Result<User> {
    match email {
        Some(email) => tracker.user_by_email(email),
        None => Err(Error::field("user", "--user <email> is required")),
    }
}

fn cmd_signup(tracker: &Tracker<FileStore>, name: String, email: String, role: String) -> Result<()> {
    let user = tracker.register(&NewUser { name, email, role })?;
    println!("✓ Welcome, {}!", user.name);
    println!("  Share code: {}", user.share_code);
    Ok(())
}

fn cmd_today(tracker: &Tracker<FileStore>, user: &User, json: bool) -> Result<()> {
    let report = tracker.today(user.id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Share code: {}", report.share_code);
    print_summary_line(&report.summary);

    if report.summary.groups.is_empty() {
        println!("\nNo medications yet. Add one with `pillbox add`.");
        return Ok(());
    }

    for group in &report.summary.groups {
        println!("\n{}", group.time_of_day);
        for entry in &group.entries {
            let mark = match entry.status {
                Some(LogStatus::Taken) => "[x]",
                Some(_) => "[ ]",
                None => "[-]",
            };
            let dosage = entry.dosage.as_deref().unwrap_or("");
            match entry.log_id {
                Some(log_id) => println!("  {} {} {}  ({})", mark, entry.medication_name, dosage, log_id),
                None => println!("  {} {} {}", mark, entry.medication_name, dosage),
            }
            if let Some(ref instructions) = entry.instructions {
                println!("      {}", instructions);
            }
        }
    }
    Ok(())
}

fn cmd_patients(tracker: &Tracker<FileStore>, user: &User, json: bool) -> Result<()> {
    let rows = tracker.dashboard(user.id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No linked patients. Link one with `pillbox link <code>`.");
        return Ok(());
    }
    for row in &rows {
        print!("{}: ", row.patient_name);
        print_summary_line(&row.summary);
    }
    Ok(())
}

fn cmd_scan(
    tracker: &Tracker<FileStore>,
    user: &User,
    config: &Config,
    image: PathBuf,
    times: Vec<String>,
) -> Result<()> {
    check_image(&image)?;

    let guess = match CommandExtractor::from_argv(&config.scan.command) {
        Some(extractor) => scan_label(&extractor, &image),
        None => {
            tracing::warn!("No [scan] command configured");
            LabelGuess {
                error: Some(PROCESS_FAILED.to_string()),
                ..LabelGuess::default()
            }
        }
    };

    if let Some(ref message) = guess.error {
        println!("{}", message);
    }
    println!("Name:         {}", guess.name);
    println!("Dosage:       {}", guess.dosage);
    println!("Instructions: {}", guess.instructions);

    if !times.is_empty() {
        let view = tracker.add_medication(user.id, &guess.into_input(times))?;
        print_saved(&view);
    }
    Ok(())
}

fn print_summary_line(summary: &AdherenceSummary) {
    println!(
        "{}: {}/{} taken ({:.0}%)",
        summary.date, summary.taken, summary.total, summary.percentage
    );
}

fn print_saved(view: &MedicationView) {
    let times: Vec<&str> = view.slots.iter().map(|s| s.slot.time_of_day.as_str()).collect();
    println!("✓ Saved {} ({})", view.medication.name, times.join(", "));
    println!("  id: {}", view.medication.id);
}
