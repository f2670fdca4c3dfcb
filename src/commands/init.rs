use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::config::{CONFIG_FILE, STARTER_CONFIG};
use crate::{DECKHAND_DIR, REPORTS_DIR};

pub fn run(project_dir: &Path, stealth: bool) -> Result<()> {
    let deckhand_dir = project_dir.join(DECKHAND_DIR);

    if deckhand_dir.exists() {
        println!("Deckhand already initialized in {}", deckhand_dir.display());
        return Ok(());
    }

    fs::create_dir_all(deckhand_dir.join(REPORTS_DIR))
        .context("Failed to create .deckhand directory")?;
    fs::write(deckhand_dir.join(CONFIG_FILE), STARTER_CONFIG)
        .context("Failed to write starter configuration")?;

    if stealth {
        add_to_gitignore(project_dir)?;
    }

    println!("Initialized deckhand in {}", deckhand_dir.display());
    println!("Edit {} to describe your environments.", deckhand_dir.join(CONFIG_FILE).display());
    Ok(())
}

/// Adds `.deckhand` to git exclusions.
/// Prefers `.git/info/exclude` if it exists (truly local), otherwise uses `.gitignore`.
fn add_to_gitignore(project_dir: &Path) -> Result<()> {
    let exclude_path = project_dir.join(".git/info/exclude");
    let gitignore_path = project_dir.join(".gitignore");

    let target_path = if exclude_path.exists() {
        exclude_path.as_path()
    } else if gitignore_path.exists() || project_dir.join(".git").is_dir() {
        gitignore_path.as_path()
    } else {
        // Not a git repo, skip
        return Ok(());
    };

    let content = fs::read_to_string(target_path).unwrap_or_default();
    if content
        .lines()
        .any(|line| line.trim() == ".deckhand" || line.trim() == ".deckhand/")
    {
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(target_path)
        .context("Failed to open git exclusion file")?;

    if !content.is_empty() && !content.ends_with('\n') {
        writeln!(file)?;
    }
    writeln!(file, ".deckhand")?;

    let path_display = if target_path == exclude_path {
        ".git/info/exclude"
    } else {
        ".gitignore"
    };
    println!("Added .deckhand to {path_display}");

    Ok(())
}
