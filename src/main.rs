use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};

use kioku::config::Config;
use kioku::level::{self, Mode};
use kioku::review;
use kioku::session::{QuizState, Session};
use kioku::store::{FileStore, Store};
use kioku::tutor::OpenAiTutor;
use kioku::{Error, Result};

/// Study terms with graded quizzes and a seven-level review schedule.
#[derive(Parser)]
#[command(name = "kioku", version, about, long_about = None)]
struct Cli {
    /// Directory holding terms.csv and history.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a term and its description
    Add { name: String, description: String },

    /// Show every term with its level and next review
    List,

    /// Find terms whose name or description contains the query
    Search { query: String },

    /// Delete a term
    Remove { name: String },

    /// Quiz in the terminal
    Drill {
        /// Quiz any term without moving levels
        #[arg(long)]
        practice: bool,
    },

    /// Show recent quiz results
    History {
        /// Delete the whole history
        #[arg(long)]
        clear: bool,
    },

    /// Reset terms that went unreviewed past their window
    Sweep,

    /// Start the web UI and API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if e.is_user_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command {
        Commands::Add { name, description } => {
            let mut session = open_session(&config)?;
            let term = session.register(&name, &description, Utc::now())?;
            println!("Added \"{}\".", term.name);
        }
        Commands::List => list(&open_session(&config)?),
        Commands::Search { query } => {
            let session = open_session(&config)?;
            let found = review::search(session.terms(), &query);
            if found.is_empty() {
                println!("No matching terms.");
            }
            for term in found {
                println!("{} [{}]", term.name, level::label(term.level));
                println!("  {}", term.description.replace('\n', "\n  "));
            }
        }
        Commands::Remove { name } => {
            let mut session = open_session(&config)?;
            session.remove(&name)?;
            println!("Removed \"{name}\".");
        }
        Commands::Drill { practice } => {
            let mode = if practice { Mode::Practice } else { Mode::Levelup };
            let session = open_session(&config)?;
            let tutor = OpenAiTutor::new(&config.tutor)?;
            drill(session, &tutor, mode)?;
        }
        Commands::History { clear } => {
            let mut session = open_session(&config)?;
            if clear {
                session.clear_history()?;
                println!("History cleared.");
            } else {
                history(&session);
            }
        }
        Commands::Sweep => {
            let store = FileStore::open(&config.data_dir)?;
            let (mut terms, history) = store.load()?;
            let reset = review::sweep(&mut terms, Utc::now());
            if reset.is_empty() {
                println!("No terms needed a reset.");
            } else {
                store.save(&terms, &history)?;
                for name in &reset {
                    println!("Reset {name} to {}.", level::label(1));
                }
            }
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| Error::Server(format!("cannot start runtime: {e}")))?;
            rt.block_on(kioku::web::serve(&config))?;
        }
    }
    Ok(())
}

fn open_session(config: &Config) -> Result<Session<FileStore>> {
    let store = FileStore::open(&config.data_dir)?;
    Session::open(store, Utc::now())
}

fn list(session: &Session<FileStore>) {
    if session.terms().is_empty() {
        println!("No terms registered yet.");
        return;
    }
    let now = Utc::now();
    for term in session.terms() {
        println!(
            "{:<24} {:<14} {:<18} {}/{} correct",
            term.name,
            level::label(term.level),
            review::review_status(term, now).to_string(),
            term.correct_count,
            term.total_attempts
        );
    }
    println!();
    println!("{} terms ready for review.", session.due_terms(now).len());
}

fn history(session: &Session<FileStore>) {
    let history = session.history();
    let stats = history.stats();
    println!("Questions answered: {}", stats.total_questions);
    println!("Average score:      {}", stats.average_score);
    println!("Registered terms:   {}", session.terms().len());
    if history.is_empty() {
        return;
    }
    println!();
    for entry in history.entries() {
        println!(
            "{}  {:>3} pts  {} [{}] ({})",
            entry.date.format("%Y/%m/%d %H:%M"),
            entry.score,
            entry.term_name,
            entry.mode,
            entry.level_change
        );
    }
}

fn read_line(stdin: &mut impl BufRead) -> Result<Option<String>> {
    let mut buf = String::new();
    let n = stdin.read_line(&mut buf)?;
    Ok((n > 0).then(|| buf.trim_end().to_string()))
}

fn prompt(text: &str) -> Result<()> {
    print!("{text}");
    io::stdout().flush()?;
    Ok(())
}

fn drill(mut session: Session<FileStore>, tutor: &OpenAiTutor, mode: Mode) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Server(format!("cannot start runtime: {e}")))?;
    let mut rng = rand::rng();
    let stdin = io::stdin();
    let mut stdin = stdin.lock();

    let mut asked = 0u32;
    let mut passed = 0u32;

    loop {
        let ticket = match rt.block_on(session.ask(tutor, mode, Utc::now(), &mut rng)) {
            Ok(ticket) => ticket,
            Err(Error::NoEligibleTerms) if asked > 0 => break,
            Err(e) => return Err(e),
        };
        let level = session.term(&ticket.term_name).map_or(0, |t| t.level);
        let question = match session.quiz() {
            QuizState::Answering { question, .. } => question.clone(),
            _ => String::new(),
        };

        println!("[{}] {} ({})", mode, ticket.term_name, level::label(level));
        println!();
        println!("{question}");
        println!();

        let outcome = loop {
            prompt("Your answer: ")?;
            let Some(answer) = read_line(&mut stdin)? else {
                session.reset_quiz();
                println!();
                summary(asked, passed);
                return Ok(());
            };
            match rt.block_on(session.answer(tutor, &answer, Utc::now())) {
                Ok(outcome) => break outcome,
                Err(e) if e.is_user_error() => println!("{e}"),
                Err(e) => println!("Grading failed: {e}. Try again."),
            }
        };

        asked += 1;
        if outcome.passed() {
            passed += 1;
        }
        println!();
        println!("Score: {}/100 ({})", outcome.grading.score, outcome.change);
        println!();
        println!("{}", outcome.grading.feedback);
        println!();
        println!("Model answer: {}", outcome.grading.model_answer);
        println!();

        session.reset_quiz();
        prompt("Next question? [Y/n] ")?;
        match read_line(&mut stdin)? {
            Some(reply) if reply.trim().eq_ignore_ascii_case("n") => break,
            None => break,
            Some(_) => println!(),
        }
    }

    summary(asked, passed);
    Ok(())
}

fn summary(asked: u32, passed: u32) {
    println!("Session complete!");
    println!("  Answered: {asked}, Passed: {passed}");
}
