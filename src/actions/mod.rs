//! OS-level actions: opening URLs, launching applications, playing music.
//!
//! The dispatcher sees the [`SystemActions`] trait; [`DesktopActions`]
//! shells out to the platform opener (`xdg-open` / `open` / `cmd start`).

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

/// Desktop integration boundary consumed by the dispatcher.
pub trait SystemActions: Send + Sync {
    /// Open a URL in the default browser. A bare domain gets an `https://`
    /// prefix.
    fn open_url(&self, url: &str) -> anyhow::Result<()>;

    /// Launch an application at the given path.
    fn launch(&self, path: &Path) -> anyhow::Result<()>;

    /// Play the first file of the music directory, in directory listing
    /// order. Returns the file name played.
    fn play_first_song(&self, music_dir: &Path) -> anyhow::Result<String>;
}

pub struct DesktopActions;

impl DesktopActions {
    /// Build a YouTube search URL for a song request.
    pub fn youtube_search_url(song: &str) -> String {
        format!(
            "https://www.youtube.com/results?search_query={}",
            song.trim().replace(' ', "+")
        )
    }
}

impl SystemActions for DesktopActions {
    fn open_url(&self, url: &str) -> anyhow::Result<()> {
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{}", url)
        };
        debug!(url = %url, "Opening URL");
        open_with_platform_opener(&url)
    }

    fn launch(&self, path: &Path) -> anyhow::Result<()> {
        debug!(path = %path.display(), "Launching application");
        Command::new(path)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to launch {}: {}", path.display(), e))?;
        Ok(())
    }

    fn play_first_song(&self, music_dir: &Path) -> anyhow::Result<String> {
        let first = first_file_in(music_dir)?;
        let name = first
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        open_with_platform_opener(&first.to_string_lossy())?;
        Ok(name)
    }
}

/// First regular file in the directory, in listing order (no sort).
fn first_file_in(dir: &Path) -> anyhow::Result<PathBuf> {
    if !dir.is_dir() {
        anyhow::bail!("Music directory not found");
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            return Ok(entry.path());
        }
    }
    anyhow::bail!("No music files found");
}

/// Hand a URL or file path to the platform's default opener.
fn open_with_platform_opener(target: &str) -> anyhow::Result<()> {
    let result = if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", "", target]).spawn()
    } else if cfg!(target_os = "macos") {
        Command::new("open").arg(target).spawn()
    } else {
        Command::new("xdg-open").arg(target).spawn()
    };

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!("Platform opener failed for {}: {}", target, e);
            Err(anyhow::anyhow!("Failed to open {}: {}", target, e))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_search_url_escapes_spaces() {
        assert_eq!(
            DesktopActions::youtube_search_url("bohemian rhapsody"),
            "https://www.youtube.com/results?search_query=bohemian+rhapsody"
        );
    }

    #[test]
    fn first_file_skips_missing_directory() {
        let err = first_file_in(Path::new("/definitely/not/here")).unwrap_err();
        assert_eq!(err.to_string(), "Music directory not found");
    }

    #[test]
    fn first_file_reports_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = first_file_in(dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "No music files found");
    }

    #[test]
    fn first_file_returns_a_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        std::fs::write(dir.path().join("track.mp3"), b"").unwrap();
        let found = first_file_in(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "track.mp3");
    }
}
