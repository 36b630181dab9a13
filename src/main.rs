use std::{
    path::PathBuf,
    process::ExitCode,
};

use clap::{
    Args,
    Parser,
    Subcommand,
};
use word_to_anki::{
    anki::{
        api::AnkiConnect,
        lifecycle::{
            AnkiProcess,
            AppLifecycle,
            ExternallyManaged,
        },
        types::DeckTarget,
        AnkiBackend,
    },
    core::{
        http::http_client,
        pipeline::Readiness,
    },
    device,
    dictionary::merriam::MerriamWebster,
    persistence::{
        get_app_data_dir,
        save_json,
        settings::{
            Settings,
            SETTINGS_FILE,
        },
        store::Store,
    },
    Pipeline,
    RunReport,
    WordToAnkiError,
};

#[derive(Parser)]
#[command(name = "word-to-anki", about = "Create Anki cards from words looked up on a Kobo", version)]
struct Cli {
    /// Local store location (default: <config dir>/word-to-anki/anki.sqlite)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the device word list and add cards for new words (default)
    Run(RunArgs),

    /// Show how many notes and stems the local store knows
    Status,

    /// Write a settings file with the defaults if there is none yet
    Init,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Device network address or mount path
    #[arg(long)]
    device: Option<String>,

    /// Merriam-Webster Collegiate API key
    #[arg(long)]
    dictionary_key: Option<String>,

    /// Target deck
    #[arg(long)]
    deck: Option<String>,

    /// Do not start or close Anki; expect AnkiConnect to be running
    #[arg(long)]
    no_manage_anki: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut settings = Settings::load();
    if let Some(store) = cli.store {
        settings.store_path = Some(store);
    }

    let result = match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(settings, args).map(|report| {
            print_report(&report);
            if report.all_failed() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }),
        Command::Status => status(&settings).map(|_| ExitCode::SUCCESS),
        Command::Init => init(&settings).map(|_| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("word-to-anki: {} failed: {}", e.dependency(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(mut settings: Settings, args: RunArgs) -> Result<RunReport, WordToAnkiError> {
    if args.device.is_some() {
        settings.device = args.device;
    }
    if args.dictionary_key.is_some() {
        settings.dictionary_key = args.dictionary_key;
    }
    if let Some(deck) = args.deck {
        settings.deck_name = deck;
    }
    if args.no_manage_anki {
        settings.manage_anki = false;
    }

    let client = http_client(settings.http_timeout())?;

    let dictionary = MerriamWebster::new(client.clone(), settings.dictionary_key()?);
    let anki_connect = AnkiConnect::new(client.clone(), &settings.anki_connect_url);
    let backend = AnkiBackend::new(
        anki_connect.clone(),
        DeckTarget {
            deck_name: settings.deck_name.clone(),
            model_name: settings.model_name.clone(),
        },
    );
    let device = device::open_source(settings.device.as_deref(), client, &get_app_data_dir())?;
    let mut store = Store::open(&settings.store_path())?;

    let mut lifecycle: Box<dyn AppLifecycle> = if settings.manage_anki {
        Box::new(AnkiProcess::default().with_api(anki_connect))
    } else {
        Box::new(ExternallyManaged)
    };

    Pipeline {
        store: &mut store,
        device: device.as_ref(),
        dictionary: &dictionary,
        backend: &backend,
        lifecycle: lifecycle.as_mut(),
        readiness: Readiness { attempts: settings.ready_attempts, wait: settings.ready_wait() },
    }
    .run()
}

fn print_report(report: &RunReport) {
    for added in &report.added {
        println!("added   {} ({})", added.headword, added.source);
    }
    for failed in &report.failed {
        println!("failed  {}: {}", failed.word, failed.reason);
    }
    println!(
        "{} added, {} skipped, {} failed{}",
        report.added.len(),
        report.skipped,
        report.failed.len(),
        match (report.synced, report.added.is_empty()) {
            (true, _) => ", synced",
            (false, false) => ", not synced",
            (false, true) => "",
        }
    );
}

fn status(settings: &Settings) -> Result<(), WordToAnkiError> {
    let path = settings.store_path();
    let store = Store::open(&path)?;
    store.ensure_schema()?;
    let stats = store.stats()?;

    println!("store:  {}", path.display());
    println!("notes:  {}", stats.notes);
    println!("stems:  {}", stats.stems);
    Ok(())
}

fn init(settings: &Settings) -> Result<(), WordToAnkiError> {
    let path = word_to_anki::persistence::get_config_file_path(SETTINGS_FILE);
    if path.exists() {
        println!("{} already exists", path.display());
        return Ok(());
    }

    // Keys from the environment stay out of the file
    let defaults = Settings { store_path: settings.store_path.clone(), ..Settings::default() };
    let path = save_json(&defaults, SETTINGS_FILE)?;
    println!("wrote {}", path.display());
    Ok(())
}
