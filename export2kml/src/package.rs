//! Writing of the final KML or KMZ file.
//!
//! The output is first written into a temporary file next to the target and then renamed over it, so a failed or
//! cancelled export never leaves a partial file behind.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PackagingError;
use crate::kml::KmlDocument;
use crate::raster::OverlayImage;

/// Format of the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain KML document.
    Kml,
    /// Zip archive with the document and overlay images.
    Kmz,
}

impl OutputFormat {
    /// File extension of the format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Kml => "kml",
            OutputFormat::Kmz => "kmz",
        }
    }

    /// Guesses the format from the file extension of the path.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        if extension.eq_ignore_ascii_case("kml") {
            Some(Self::Kml)
        } else if extension.eq_ignore_ascii_case("kmz") {
            Some(Self::Kmz)
        } else {
            None
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutputFormat::Kml => "KML",
            OutputFormat::Kmz => "KMZ",
        })
    }
}

/// Writes the document and the overlay images into the target file and returns its path.
///
/// Every overlay reference in the document must have exactly one image and every image must be referenced. Plain
/// KML output cannot contain images.
pub fn package(
    document: &KmlDocument,
    images: &[&OverlayImage],
    target: &Path,
    format: OutputFormat,
    document_entry: &str,
) -> Result<PathBuf, PackagingError> {
    check_references(document.overlay_hrefs(), images, format)?;
    let content = document.to_bytes()?;

    let directory = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".part")
        .tempfile_in(&directory)?;

    match format {
        OutputFormat::Kml => {
            let mut writer = BufWriter::new(temp.as_file_mut());
            writer.write_all(&content)?;
            writer.flush()?;
        }
        OutputFormat::Kmz => write_archive(temp.as_file_mut(), &content, images, document_entry)?,
    }

    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|err| PackagingError::Io(err.error))?;

    log::info!(
        "Wrote {format} file {} with {} overlay image(s)",
        target.display(),
        images.len()
    );

    Ok(target.to_path_buf())
}

fn check_references(
    hrefs: &[String],
    images: &[&OverlayImage],
    format: OutputFormat,
) -> Result<(), PackagingError> {
    if format == OutputFormat::Kml && !images.is_empty() {
        return Err(PackagingError::ImagesInKml(images.len()));
    }

    let mut referenced = HashSet::new();
    for href in hrefs {
        if !referenced.insert(href.as_str()) {
            return Err(PackagingError::DuplicateEntry(href.clone()));
        }
    }

    let mut packaged = HashSet::new();
    for image in images {
        if !packaged.insert(image.archive_path.as_str()) {
            return Err(PackagingError::DuplicateEntry(image.archive_path.clone()));
        }
    }

    if let Some(dangling) = hrefs.iter().find(|h| !packaged.contains(h.as_str())) {
        return Err(PackagingError::DanglingReference(dangling.clone()));
    }

    if let Some(orphan) = images.iter().find(|i| !referenced.contains(i.archive_path.as_str())) {
        return Err(PackagingError::OrphanedImage(orphan.archive_path.clone()));
    }

    Ok(())
}

/// Options of archive entries. The modification time is fixed to the zip epoch.
fn entry_options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644)
}

fn write_archive(
    file: &mut File,
    content: &[u8],
    images: &[&OverlayImage],
    document_entry: &str,
) -> Result<(), PackagingError> {
    let mut zip = ZipWriter::new(file);
    zip.start_file(document_entry, entry_options(CompressionMethod::Deflated))?;
    zip.write_all(content)?;

    for image in images {
        // PNG data is already compressed
        zip.start_file(image.archive_path.as_str(), entry_options(CompressionMethod::Stored))?;
        let mut source = File::open(&image.file)?;
        std::io::copy(&mut source, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use export2kml_types::cartesian::Size;
    use std::io::Read;

    fn image(archive_path: &str, file: PathBuf) -> OverlayImage {
        OverlayImage {
            archive_path: archive_path.to_string(),
            file,
            size: Size::new(1, 1),
        }
    }

    fn document_with_overlay(href: &str) -> KmlDocument {
        let mut document = KmlDocument::new(Some("test"));
        document.add_overlay(&crate::tests::overlay_record(href));
        document
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("a/b.KMZ")), Some(OutputFormat::Kmz));
        assert_eq!(OutputFormat::from_path(Path::new("b.kml")), Some(OutputFormat::Kml));
        assert_eq!(OutputFormat::from_path(Path::new("b.zip")), None);
    }

    #[test]
    fn plain_kml() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.kml");
        package(&KmlDocument::new(Some("test")), &[], &target, OutputFormat::Kml, "doc.kml").unwrap();

        let text = std::fs::read_to_string(&target).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<name>test</name>"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn archive_entries() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("source.png");
        std::fs::write(&png, b"not really a png").unwrap();
        let target = dir.path().join("out.kmz");

        let document = document_with_overlay("rasters/a.png");
        let images = [image("rasters/a.png", png)];
        let refs: Vec<_> = images.iter().collect();
        package(&document, &refs, &target, OutputFormat::Kmz, "doc.kml").unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&target).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.by_index(0).unwrap().name(), "doc.kml");

        let mut content = Vec::new();
        archive
            .by_name("rasters/a.png")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"not really a png");
    }

    #[test]
    fn reference_checks() {
        let document = document_with_overlay("rasters/a.png");
        let a = image("rasters/a.png", PathBuf::from("a.png"));
        let b = image("rasters/b.png", PathBuf::from("b.png"));

        assert_matches!(
            check_references(document.overlay_hrefs(), &[], OutputFormat::Kmz),
            Err(PackagingError::DanglingReference(path)) if path == "rasters/a.png"
        );
        assert_matches!(
            check_references(document.overlay_hrefs(), &[&a, &b], OutputFormat::Kmz),
            Err(PackagingError::OrphanedImage(path)) if path == "rasters/b.png"
        );
        assert_matches!(
            check_references(document.overlay_hrefs(), &[&a, &a], OutputFormat::Kmz),
            Err(PackagingError::DuplicateEntry(_))
        );
        assert_matches!(
            check_references(document.overlay_hrefs(), &[&a], OutputFormat::Kml),
            Err(PackagingError::ImagesInKml(1))
        );
        assert!(check_references(document.overlay_hrefs(), &[&a], OutputFormat::Kmz).is_ok());
    }

    #[test]
    fn failed_packaging_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.kmz");
        std::fs::write(&target, b"previous").unwrap();

        let document = document_with_overlay("rasters/a.png");
        let missing = image("rasters/a.png", dir.path().join("missing.png"));
        let result = package(&document, &[&missing], &target, OutputFormat::Kmz, "doc.kml");

        assert_matches!(result, Err(PackagingError::Io(_)));
        assert_eq!(std::fs::read(&target).unwrap(), b"previous");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
