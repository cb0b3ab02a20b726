use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::error::{HarvestError, Result};
use crate::layout::{has_image_extension, sanitize_filename, SeriesLayout};
use crate::report::{Reporter, Stage};

#[derive(Debug, Default)]
pub struct PackageReport {
    pub written: Vec<PathBuf>,
    /// Chapter directories without a single valid image
    pub skipped: Vec<String>,
    pub failures: Vec<(String, HarvestError)>,
}

/// Image file names of `dir`, sorted
pub fn chapter_images(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if has_image_extension(&path) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Write `files` (names inside `dir`) into a deflated archive at `output`.
/// The archive is assembled next to `output` and renamed over it at the end.
pub fn write_archive(dir: &Path, files: &[String], output: &Path) -> Result<()> {
    let mut tmp_name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = output.with_file_name(tmp_name);

    let result = (|| -> Result<()> {
        let mut zip = ZipWriter::new(BufWriter::new(File::create(&tmp_path)?));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for name in files {
            zip.start_file(name.as_str(), options)?;
            let mut source = File::open(dir.join(name))?;
            io::copy(&mut source, &mut zip)?;
        }
        zip.finish()?.flush()?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            fs::rename(&tmp_path, output)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

pub struct ArchivePackager {
    extension: String,
    reporter: Arc<dyn Reporter>,
}

impl ArchivePackager {
    pub fn new(extension: impl Into<String>, reporter: Arc<dyn Reporter>) -> Self {
        let extension = extension.into().trim_start_matches('.').to_string();
        Self { extension, reporter }
    }

    pub fn archive_name(&self, prefix: &str, chapter: &str) -> String {
        sanitize_filename(&format!("{} {}.{}", prefix, chapter, self.extension))
    }

    /// Package every chapter directory of `layout` into `<prefix> <chapter>.<ext>`
    pub fn run(&self, layout: &SeriesLayout, prefix: &str) -> Result<PackageReport> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(HarvestError::InvalidInput("archive prefix is empty".to_string()));
        }

        self.reporter.info(
            Stage::Archive,
            &format!("Series: {} | Prefix: {}", layout.name(), prefix),
        );

        let chapters_dir = layout.chapters_dir();
        if !chapters_dir.is_dir() {
            self.reporter
                .warn(Stage::Archive, "Chapters directory does not exist. Nothing to package.");
            return Ok(PackageReport::default());
        }

        let archives_dir = layout.archives_dir();
        fs::create_dir_all(&archives_dir)?;

        let mut chapter_dirs: Vec<(String, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&chapters_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                chapter_dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
            }
        }
        chapter_dirs.sort();

        let mut report = PackageReport::default();
        for (chapter, dir) in chapter_dirs {
            let output = archives_dir.join(self.archive_name(prefix, &chapter));
            self.reporter.info(
                Stage::Archive,
                &format!("Creating {} from '{}'", layout.display_path(&output), chapter),
            );

            let files = match chapter_images(&dir) {
                Ok(files) => files,
                Err(e) => {
                    self.reporter
                        .error(Stage::Archive, &format!("Cannot list '{}': {}", chapter, e));
                    report.failures.push((chapter, e.into()));
                    continue;
                }
            };
            if files.is_empty() {
                self.reporter
                    .warn(Stage::Archive, &format!("'{}' has no valid images, skipped", chapter));
                report.skipped.push(chapter);
                continue;
            }

            match write_archive(&dir, &files, &output) {
                Ok(()) => {
                    self.reporter.info(
                        Stage::Archive,
                        &format!("OK: '{}' packaged ({} images)", chapter, files.len()),
                    );
                    report.written.push(output);
                }
                Err(e) => {
                    self.reporter.error(
                        Stage::Archive,
                        &format!("Error creating {}: {}", layout.display_path(&output), e),
                    );
                    report.failures.push((chapter, e));
                }
            }
        }

        self.reporter.info(
            Stage::Archive,
            &format!("Conversion finished: {} archives", report.written.len()),
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RecordingReporter;

    #[test]
    fn test_archive_name() {
        let packager = ArchivePackager::new(".cbz", Arc::new(RecordingReporter::new()));
        assert_eq!(packager.archive_name("Solo Leveling", "10.5"), "Solo Leveling 10.5.cbz");
    }

    #[test]
    fn test_chapter_images_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.jpg", "a.jpg", "B.PNG", "info.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        assert_eq!(chapter_images(dir.path()).unwrap(), vec!["B.PNG", "a.jpg", "c.jpg"]);
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SeriesLayout::new(dir.path(), "series").unwrap();
        let packager = ArchivePackager::new("cbz", Arc::new(RecordingReporter::new()));
        assert!(matches!(
            packager.run(&layout, "  "),
            Err(HarvestError::InvalidInput(_))
        ));
    }
}
