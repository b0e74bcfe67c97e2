//! file_selector.rs
//!
//! Decides which walked entries are worth ingesting. Pure; no I/O.
//!
//! Rules, in order:
//! 1. anything inside a `.git` directory, or whose base name starts with `.`
//! 2. directories
//! 3. anything whose lowercased extension is not allow-listed
//!
//! are rejected; the rest is accepted.

use std::path::Path;

use crate::ingest::scanner::FileCandidate;

const VCS_DIR: &str = ".git";
const HIDDEN_PREFIX: char = '.';

/// Plain text and markdown.
pub const ALLOWED_EXTENSIONS: &[&str] = &["txt", "md"];

pub fn should_process(candidate: &FileCandidate) -> bool {
    if is_vcs_or_hidden(&candidate.path) {
        return false;
    }
    if candidate.is_dir {
        return false;
    }
    has_allowed_extension(&candidate.path)
}

fn is_vcs_or_hidden(path: &Path) -> bool {
    if path.components().any(|c| c.as_os_str() == VCS_DIR) {
        return true;
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(HIDDEN_PREFIX))
}

fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    fn file(p: &str) -> FileCandidate {
        FileCandidate {
            path: PathBuf::from(p),
            is_dir: false,
        }
    }

    fn dir(p: &str) -> FileCandidate {
        FileCandidate {
            path: PathBuf::from(p),
            is_dir: true,
        }
    }

    #[rstest]
    #[case("/kb/notes.txt")]
    #[case("/kb/README.md")]
    #[case("/kb/deep/er/Plan.MD")]
    #[case("/kb/Journal.Txt")]
    #[case("/kb/.obsidian/inside-hidden-dir.md")]
    #[case("/kb/.github/workflow-notes.md")]
    #[case("relative/notes.md")]
    fn accepts_text_and_markdown(#[case] path: &str) {
        assert!(should_process(&file(path)));
    }

    #[rstest]
    #[case("/kb/image.png")]
    #[case("/kb/data.json")]
    #[case("/kb/archive.md.gz")]
    #[case("/kb/Makefile")]
    #[case("/kb/notes.markdown")]
    fn rejects_other_extensions(#[case] path: &str) {
        assert!(!should_process(&file(path)));
    }

    #[rstest]
    #[case("/kb/.hidden.md")]
    #[case("/kb/sub/.draft.txt")]
    #[case("/kb/.gitignore")]
    #[case("/kb/.DS_Store")]
    fn rejects_hidden_files(#[case] path: &str) {
        assert!(!should_process(&file(path)));
    }

    #[rstest]
    #[case("/kb/.git/description.txt")]
    #[case("/kb/sub/.git/logs/HEAD.md")]
    fn rejects_anything_under_git(#[case] path: &str) {
        assert!(!should_process(&file(path)));
    }

    #[rstest]
    #[case("/kb")]
    #[case("/kb/chapter.md")]
    #[case("/kb/notes.txt")]
    fn rejects_directories_regardless_of_extension(#[case] path: &str) {
        assert!(!should_process(&dir(path)));
    }
}
