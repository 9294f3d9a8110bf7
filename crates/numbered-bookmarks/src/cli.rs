//! Command-line host adapter: translates commands into session operations.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::app::navigation::{NavigationPolicy, Resolution};
use crate::app::session::{ListEntry, ListScope, Session, SessionOptions, SessionStorage, Settings};
use crate::app::sticky::{DocumentChange, LineEdit};
use crate::domain::model::{Slot, ToggleOutcome, WorkspaceFolder};
use crate::infra::config::Config;
use crate::infra::git;
use crate::infra::persistence::default_state_dir;

#[derive(Debug, Parser)]
#[command(
    name = "numbered-bookmarks",
    author,
    version,
    about = "Numbered bookmarks that stay on their lines while files change",
    long_about = None
)]
pub struct Cli {
    /// Workspace directory (defaults to the git worktree containing the current directory)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,
    /// Extra workspace folder for multi-root workspaces (repeatable)
    #[arg(long = "folder", global = true)]
    pub folders: Vec<PathBuf>,
    /// Navigation policy for this invocation: strict, replace, or allowDuplicates
    #[arg(long, global = true)]
    pub policy: Option<NavigationPolicy>,
    /// Directory for session state (defaults to the user data directory)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

/// Line numbers on the command line are 1-based.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Toggle a numbered bookmark on a line
    Toggle {
        file: PathBuf,
        #[arg(value_parser = parse_slot)]
        slot: Slot,
        #[arg(value_parser = parse_line)]
        line: usize,
    },
    /// Print the target of a numbered jump as path:line
    Jump {
        file: PathBuf,
        #[arg(value_parser = parse_slot)]
        slot: Slot,
        /// Line the cursor is on
        #[arg(long, value_parser = parse_line)]
        cursor: Option<usize>,
    },
    /// List bookmarks of one file, or of every file
    List { file: Option<PathBuf> },
    /// Clear bookmarks
    #[command(group(ArgGroup::new("target").required(true).args(["file", "all_files"])))]
    Clear {
        file: Option<PathBuf>,
        /// Only clear this slot
        #[arg(long, value_parser = parse_slot, requires = "file")]
        slot: Option<Slot>,
        /// Clear every file
        #[arg(long)]
        all_files: bool,
    },
    /// Reposition bookmarks after the file was edited elsewhere
    Edit {
        file: PathBuf,
        /// Line count after the edit (0 for an empty file)
        #[arg(long)]
        lines: usize,
        /// Edit as START:END:DELTA, applied in order (repeatable)
        #[arg(long = "change", value_parser = parse_change)]
        changes: Vec<LineEdit>,
    },
    /// Generate shell completions
    Completions { shell: Shell },
}

/// Run a parsed command line against the persisted workspace state.
pub fn run(cli: Cli) -> Result<ExitCode> {
    let mut stdout = std::io::stdout().lock();

    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "numbered-bookmarks", &mut stdout);
        return Ok(ExitCode::SUCCESS);
    }

    let cwd = env::current_dir().context("unable to determine working directory")?;
    let workspace = match &cli.workspace {
        Some(dir) => resolve_path(&cwd, dir),
        None => resolve_path(&cwd, &git::workspace_root(&cwd)),
    };

    let mut config = Config::load(&workspace)?;
    if let Some(policy) = cli.policy {
        config = config.with_policy(policy.as_str());
    }

    let mut folders = vec![WorkspaceFolder::new(&workspace)];
    for folder in &cli.folders {
        let folder = WorkspaceFolder::new(resolve_path(&cwd, folder));
        if !folders.contains(&folder) {
            folders.push(folder);
        }
    }

    let state_dir = cli
        .state_dir
        .clone()
        .or_else(default_state_dir)
        .context("no user data directory available; pass --state-dir")?;

    let mut session = Session::open(SessionOptions {
        folders,
        settings: Settings::from_config(&config),
        storage: SessionStorage::StateDir {
            state_dir,
            workspace,
        },
    })?;

    let code = dispatch(&mut session, cli.command, &cwd, &mut stdout)?;
    for notice in session.close() {
        eprintln!("{notice}");
    }
    Ok(code)
}

fn dispatch(
    session: &mut Session,
    command: Command,
    cwd: &Path,
    out: &mut impl Write,
) -> Result<ExitCode> {
    match command {
        Command::Toggle { file, slot, line } => {
            let file = resolve_path(cwd, &file);
            session.open_document(&file);
            match session.toggle(slot, line)? {
                ToggleOutcome::Set { slot, .. } => {
                    writeln!(out, "set slot {slot} at {}:{}", file.display(), line + 1)?
                }
                ToggleOutcome::Cleared { slot } => {
                    writeln!(out, "cleared slot {slot} at {}:{}", file.display(), line + 1)?
                }
            }
        }
        Command::Jump { file, slot, cursor } => {
            session.open_document(resolve_path(cwd, &file));
            match session.jump(slot, cursor)? {
                Resolution::Target(target) => {
                    writeln!(out, "{}:{}", target.path.display(), target.line + 1)?
                }
                Resolution::NotDefined { .. } => return Ok(ExitCode::FAILURE),
            }
        }
        Command::List { file } => {
            let scope = match file {
                Some(file) => {
                    session.open_document(resolve_path(cwd, &file));
                    ListScope::Active
                }
                None => ListScope::AllFiles,
            };
            write!(out, "{}", render_list(&session.list(scope)))?;
        }
        Command::Clear {
            file,
            slot,
            all_files,
        } => {
            let changed = match (file, slot) {
                _ if all_files => session.clear_all_files(),
                (Some(file), Some(slot)) => session.clear_slot(&resolve_path(cwd, &file), slot),
                (Some(file), None) => session.clear_file(&resolve_path(cwd, &file)),
                (None, _) => false,
            };
            writeln!(out, "{}", if changed { "cleared" } else { "nothing to clear" })?;
        }
        Command::Edit {
            file,
            lines,
            changes,
        } => {
            let file = resolve_path(cwd, &file);
            session.open_document(&file);
            let change = DocumentChange::new(changes, lines);
            let changed = session.apply_change(&file, &change);
            writeln!(out, "{}", if changed { "repositioned" } else { "unchanged" })?;
        }
        Command::Completions { .. } => {}
    }
    Ok(ExitCode::SUCCESS)
}

/// One line per bookmark: slot, label with 1-based line, and the line's text when readable.
pub fn render_list(entries: &[ListEntry]) -> String {
    let mut rendered = String::new();
    let mut contents: Option<(PathBuf, Vec<String>)> = None;

    for entry in entries {
        if contents.as_ref().is_none_or(|(path, _)| *path != entry.path) {
            let lines = fs::read_to_string(&entry.path)
                .map(|text| text.lines().map(str::to_owned).collect())
                .unwrap_or_default();
            contents = Some((entry.path.clone(), lines));
        }
        let preview = contents
            .as_ref()
            .and_then(|(_, lines)| lines.get(entry.line))
            .map(|text| text.trim())
            .unwrap_or_default();

        let location = format!("{}:{}", entry.label.label, entry.line + 1);
        if preview.is_empty() {
            rendered.push_str(&format!("[{}] {location}\n", entry.slot));
        } else {
            rendered.push_str(&format!("[{}] {location}  {preview}\n", entry.slot));
        }
    }
    rendered
}

fn resolve_path(cwd: &Path, path: &Path) -> PathBuf {
    let joined = cwd.join(path);
    fs::canonicalize(&joined).unwrap_or(joined)
}

fn parse_slot(value: &str) -> Result<Slot, String> {
    let index: usize = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a slot number"))?;
    Slot::new(index).map_err(|err| err.to_string())
}

fn parse_line(value: &str) -> Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(line) if line >= 1 => Ok(line - 1),
        _ => Err(format!("'{value}' is not a line number (lines start at 1)")),
    }
}

fn parse_change(value: &str) -> Result<LineEdit, String> {
    let mut parts = value.split(':');
    let (Some(start), Some(end), Some(delta), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("'{value}' is not START:END:DELTA"));
    };
    let start = parse_line(start)?;
    let end = parse_line(end)?;
    let delta = delta
        .trim()
        .parse::<isize>()
        .map_err(|_| format!("'{delta}' is not a line delta"))?;
    Ok(LineEdit::new(start, end, delta))
}
