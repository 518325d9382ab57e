use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: File and directory utilities

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    // @generates: `<stem>_<target>.<ext>` for a processed subtitle
    // @params: input_file, input_root, output_dir, target_language
    //
    // With an output directory, the input's position below `input_root` is
    // mirrored inside it. Without one, the output lands next to the input.
    pub fn output_path(
        input_file: &Path,
        input_root: Option<&Path>,
        output_dir: Option<&Path>,
        target_language: &str,
    ) -> PathBuf {
        let stem = input_file.file_stem().unwrap_or_default().to_string_lossy();
        let extension = input_file
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "srt".to_string());
        let file_name = format!("{}_{}.{}", stem, target_language, extension);

        let parent = input_file.parent().unwrap_or_else(|| Path::new(""));
        let directory = match output_dir {
            Some(out) => {
                let relative = input_root
                    .and_then(|root| parent.strip_prefix(root).ok())
                    .unwrap_or_else(|| Path::new(""));
                out.join(relative)
            }
            None => parent.to_path_buf(),
        };

        directory.join(file_name)
    }

    /// Find files with a specific extension, sorted by path
    pub fn find_files<P: AsRef<Path>>(dir: P, extension: &str, recursive: bool) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(anyhow!("Input directory does not exist: {:?}", dir));
        }

        let wanted = extension.trim_start_matches('.');
        let mut walker = WalkDir::new(dir).follow_links(true).sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut result = Vec::new();
        for entry in walker {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(wanted))
            {
                result.push(path.to_path_buf());
            }
        }

        Ok(result)
    }

    /// Write a string to a file, creating parent directories
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        fs::write(&path, content).with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))?;
        Ok(())
    }
}
