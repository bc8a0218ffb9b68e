//! Skyfeed - Entry Point

use clap::Parser;
use skyfeed::config::{
    apply_cli_overrides, apply_env_overrides, load_config_with_precedence, merge_config,
};
use skyfeed::feed::FeedWindow;
use skyfeed::model::{Cursor, FetchError, PagerError, RawPage};
use skyfeed::pager::{FeedPager, FetchApi};
use skyfeed::replay::PageReplay;
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{info, warn};

/// Skyfeed - rebuild a timeline window from recorded pages
#[derive(Parser, Debug)]
#[command(name = "skyfeed")]
#[command(version)]
#[command(about = "Merge recorded timeline pages into a feed window and print it")]
pub struct Args {
    /// Replay file to rebuild the window from
    pub replay: Option<PathBuf>,

    /// Timeline page JSON file to append; repeat for more pages
    #[arg(short, long = "page", value_name = "FILE")]
    pub pages: Vec<PathBuf>,

    /// Write the resulting replay to this file
    #[arg(long, value_name = "FILE")]
    pub save_replay: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bound on stored posts (must be positive)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_timeline_size: Option<u64>,

    /// Output width in terminal columns
    #[arg(short, long, default_value = "100")]
    pub width: usize,

    /// Show replies without their thread root and parent
    #[arg(long)]
    pub no_thread_assembly: bool,
}

/// Serves page files in order, whatever cursor is asked for.
struct PageFiles {
    files: VecDeque<PathBuf>,
}

impl FetchApi for PageFiles {
    fn fetch_page(&mut self, cursor: Option<&Cursor>, _page_size: usize) -> Result<RawPage, FetchError> {
        let path = self.files.pop_front().ok_or_else(|| FetchError::Transport {
            message: "no more page files".to_string(),
        })?;
        info!(path = %path.display(), cursor = ?cursor, "Reading page file");
        let raw = std::fs::read_to_string(&path).map_err(|e| FetchError::Transport {
            message: format!("{}: {e}", path.display()),
        })?;
        Ok(skyfeed::parser::parse_page(&raw)?)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Defaults → Config File → Env Vars → CLI Args
    let config = {
        let config_file = load_config_with_precedence(args.config.clone())?;
        let merged = merge_config(config_file);
        let with_env = apply_env_overrides(merged);
        let size_override = args
            .max_timeline_size
            .and_then(|size| usize::try_from(size).ok());
        let assemble_override = args.no_thread_assembly.then_some(false);
        apply_cli_overrides(with_env, size_override, assemble_override)
    };
    config.validate()?;

    skyfeed::logging::init(&config.log_file_path)?;
    info!(config = ?config, "Configuration loaded and resolved");

    let window = FeedWindow::with_policy(config.max_timeline_size, config.feed_policy()?);
    let mut pager = FeedPager::new(window, config.pager_settings());

    if let Some(path) = &args.replay {
        let replay = PageReplay::load(path)?;
        replay.replay(pager.window_mut())?;
        info!(path = %path.display(), rows = pager.window().len(), "Replayed");
        if args.save_replay.is_some() {
            pager.record_into(replay);
        }
    } else if args.save_replay.is_some() {
        pager.record();
    }

    let mut files = PageFiles {
        files: args.pages.iter().cloned().collect(),
    };
    while !files.files.is_empty() {
        let result = if pager.window().is_empty() {
            pager.fetch_reload(&mut files)
        } else {
            pager.fetch_next_page(&mut files)
        };
        match result {
            Ok(outcome) => info!(posts_added = outcome.posts_added, "Page merged"),
            Err(PagerError::NoCursor) => {
                warn!(skipped = files.files.len(), "End of feed reached, ignoring remaining pages");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    if let (Some(path), Some(replay)) = (&args.save_replay, pager.recording()) {
        replay.save(path)?;
        info!(path = %path.display(), pages = replay.page_count(), "Saved replay");
    }

    println!("{}", skyfeed::view::render_window(pager.window(), args.width));
    if let Some(status) = pager.status() {
        eprintln!("{}", status.text);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_does_not_error() {
        let result = Args::try_parse_from(["skyfeed", "--help"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_does_not_error() {
        let result = Args::try_parse_from(["skyfeed", "--version"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_no_args_defaults() {
        let args = Args::parse_from(["skyfeed"]);
        assert_eq!(args.replay, None);
        assert!(args.pages.is_empty());
        assert_eq!(args.save_replay, None);
        assert_eq!(args.config, None);
        assert_eq!(args.max_timeline_size, None);
        assert_eq!(args.width, 100);
        assert!(!args.no_thread_assembly);
    }

    #[test]
    fn test_replay_positional_and_repeated_pages() {
        let args = Args::parse_from([
            "skyfeed",
            "replay.json",
            "--page",
            "one.json",
            "-p",
            "two.json",
        ]);
        assert_eq!(args.replay, Some(PathBuf::from("replay.json")));
        assert_eq!(
            args.pages,
            vec![PathBuf::from("one.json"), PathBuf::from("two.json")]
        );
    }

    #[test]
    fn test_max_timeline_size_rejects_zero() {
        let result = Args::try_parse_from(["skyfeed", "--max-timeline-size", "0"]);
        assert!(result.is_err());

        let args = Args::parse_from(["skyfeed", "--max-timeline-size", "250"]);
        assert_eq!(args.max_timeline_size, Some(250));
    }

    #[test]
    fn test_width_and_thread_assembly_flags() {
        let args = Args::parse_from(["skyfeed", "-w", "60", "--no-thread-assembly"]);
        assert_eq!(args.width, 60);
        assert!(args.no_thread_assembly);
    }

    #[test]
    fn test_page_files_serve_in_order() {
        let dir = std::env::temp_dir().join(format!("skyfeed_main_pages_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let first = dir.join("first.json");
        std::fs::write(&first, r#"{"feed": [], "cursor": "c1"}"#).unwrap();

        let mut files = PageFiles {
            files: VecDeque::from(vec![first, dir.join("missing.json")]),
        };

        let page = files.fetch_page(None, 100).unwrap();
        assert_eq!(page.next_cursor.map(|c| c.as_str().to_string()), Some("c1".to_string()));
        assert!(matches!(
            files.fetch_page(None, 100),
            Err(FetchError::Transport { .. })
        ));
        assert!(matches!(
            files.fetch_page(None, 100),
            Err(FetchError::Transport { .. })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_thread_assembly_flag_flows_through_config_chain() {
        use skyfeed::config::{ConfigFile, ResolvedConfig};

        let config_file = ConfigFile {
            max_timeline_size: Some(700),
            ..ConfigFile::default()
        };
        let merged = merge_config(Some(config_file));
        assert_eq!(merged.max_timeline_size, 700);

        let with_cli = apply_cli_overrides(merged, None, Some(false));
        assert_eq!(with_cli.max_timeline_size, 700);
        assert!(!with_cli.assemble_threads);
        assert!(ResolvedConfig::default().assemble_threads);
    }
}
