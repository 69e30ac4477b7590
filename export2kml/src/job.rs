//! Export job: validation, per-layer processing and packaging.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{ConfigurationError, ExportError, LayerError};
use crate::ids::IdAllocator;
use crate::kml::KmlDocument;
use crate::layer::{LayerRef, RasterLayer, VectorLayer};
use crate::mapping::FieldMapping;
use crate::options::ExportOptions;
use crate::package::{package, OutputFormat};
use crate::raster::{OverlayRecord, Rasterizer};
use crate::render::{RasterRenderer, StyledGridRenderer};
use crate::report::{ExportReport, FeatureIssue, LayerReport};
use crate::translate::{translate, FeatureError, LayerContext, PlacemarkRecord};
use crate::workspace::Workspace;

/// Receives progress notifications of a running job.
pub trait ProgressSink {
    /// Called after every layer with the number of processed layers and the total number of layers.
    fn progress(&self, processed: usize, total: usize);
}

impl<F: Fn(usize, usize)> ProgressSink for F {
    fn progress(&self, processed: usize, total: usize) {
        self(processed, total)
    }
}

/// Tells a running job whether it should stop.
///
/// The job checks for cancellation before every layer and before writing the output.
pub trait Cancellation {
    /// Returns true if the job should stop.
    fn is_cancelled(&self) -> bool;
}

impl<F: Fn() -> bool> Cancellation for F {
    fn is_cancelled(&self) -> bool {
        self()
    }
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl<T: Cancellation + ?Sized> Cancellation for Arc<T> {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

/// State of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// The job has not been started yet.
    Idle,
    /// Configuration is being checked.
    Validating,
    /// A layer is being processed.
    Processing {
        /// Index of the layer in the job.
        index: usize,
        /// Total number of layers.
        total: usize,
    },
    /// The output file is being written.
    Packaging,
    /// The last run finished successfully.
    Done,
    /// The last run failed or was cancelled.
    Failed,
}

impl JobState {
    /// Returns true if the job is running.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            JobState::Validating | JobState::Processing { .. } | JobState::Packaging
        )
    }
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Path of the written file.
    pub path: PathBuf,
    /// Format of the written file.
    pub format: OutputFormat,
    /// Outcome of every layer.
    pub report: ExportReport,
}

struct JobLayer {
    layer: LayerRef,
    mapping: FieldMapping,
}

enum LayerContent {
    Placemarks(Vec<PlacemarkRecord>),
    Overlay(OverlayRecord),
}

struct LayerOutput {
    folder_name: String,
    content: LayerContent,
}

/// Export of a set of layers into one KML or KMZ file.
///
/// ```ignore
/// let job = ExportJob::new("out.kmz", OutputFormat::Kmz)
///     .with_layer(LayerRef::vector(roads), mapping);
/// let summary = job.run(&|done, total| println!("{done}/{total}"), &|| false)?;
/// ```
///
/// A job can be run any number of times. Every run reads the layers again and overwrites the target file.
pub struct ExportJob {
    layers: Vec<JobLayer>,
    target: PathBuf,
    format: OutputFormat,
    options: ExportOptions,
    renderer: Box<dyn RasterRenderer>,
    state: Mutex<JobState>,
}

impl ExportJob {
    /// Creates a job without layers.
    pub fn new(target: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            layers: vec![],
            target: target.into(),
            format,
            options: ExportOptions::default(),
            renderer: Box::new(StyledGridRenderer),
            state: Mutex::new(JobState::Idle),
        }
    }

    /// Adds a layer. Layers are exported in the order they are added.
    pub fn with_layer(mut self, layer: LayerRef, mapping: FieldMapping) -> Self {
        self.layers.push(JobLayer { layer, mapping });
        self
    }

    /// Sets the options.
    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the renderer used for raster layers.
    pub fn with_renderer(mut self, renderer: impl RasterRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    /// Options of the job.
    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Current state.
    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    /// Format that is actually written. Jobs with raster layers are always written as KMZ, since overlay images
    /// cannot be stored in a plain KML file.
    pub fn effective_format(&self) -> OutputFormat {
        let has_rasters = self
            .layers
            .iter()
            .any(|l| matches!(l.layer, LayerRef::Raster(_)));
        if has_rasters {
            OutputFormat::Kmz
        } else {
            self.format
        }
    }

    /// Path of the file the job writes. If the format is switched to KMZ, a `.kml` extension is replaced too.
    pub fn output_path(&self) -> PathBuf {
        let format = self.effective_format();
        if format != self.format
            && OutputFormat::from_path(&self.target) == Some(self.format)
        {
            self.target.with_extension(format.extension())
        } else {
            self.target.clone()
        }
    }

    /// Runs the export.
    ///
    /// Layers that fail are skipped and reported in the summary. The run fails as a whole only if the
    /// configuration is invalid, the output cannot be written, no layer could be exported, or it is cancelled.
    /// In any of these cases the target file is left untouched.
    pub fn run(
        &self,
        progress: &dyn ProgressSink,
        cancel: &dyn Cancellation,
    ) -> Result<ExportSummary, ExportError> {
        {
            let mut state = self.state.lock();
            if state.is_running() {
                return Err(ExportError::ConcurrentJob);
            }
            *state = JobState::Validating;
        }

        let _guard = RunGuard { state: &self.state };
        let result = self.run_inner(progress, cancel);
        match &result {
            Ok(summary) => {
                log::info!("Export to {} finished", summary.path.display());
                self.set_state(JobState::Done);
            }
            Err(err) => {
                log::error!("Export to {} failed: {err}", self.target.display());
                self.set_state(JobState::Failed);
            }
        }

        result
    }

    fn set_state(&self, state: JobState) {
        *self.state.lock() = state;
    }

    fn run_inner(
        &self,
        progress: &dyn ProgressSink,
        cancel: &dyn Cancellation,
    ) -> Result<ExportSummary, ExportError> {
        let path = self.output_path();
        let format = self.effective_format();
        if format != self.format {
            log::info!(
                "Job contains raster layers, writing {format} to {} instead of {}",
                path.display(),
                self.format
            );
        }
        self.validate(&path)?;

        let now = Utc::now();
        let total = self.layers.len();
        let mut workspace = Workspace::new(self.options.temp_dir.as_deref(), &self.options.raster_dir)
            .map_err(ExportError::TempDir)?;
        let rasterizer = Rasterizer::new(self.renderer.as_ref(), &self.options.raster);

        let mut ids = IdAllocator::new();
        let mut report = ExportReport::default();
        let mut outputs = Vec::with_capacity(total);
        for (index, job_layer) in self.layers.iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!("Export cancelled before layer {index}");
                return Err(ExportError::Cancelled);
            }
            self.set_state(JobState::Processing { index, total });
            let context = LayerContext::new(ids.layer_prefix(job_layer.layer.name()), now);

            let folder_name = job_layer
                .mapping
                .folder_name()
                .unwrap_or(job_layer.layer.name())
                .to_string();
            let content = match &job_layer.layer {
                LayerRef::Vector(layer) => {
                    process_vector(layer.as_ref(), &job_layer.mapping, &context, &mut report)
                }
                LayerRef::Raster(layer) => process_raster(
                    layer.as_ref(),
                    &job_layer.mapping,
                    &context,
                    &rasterizer,
                    &mut workspace,
                    &mut report,
                ),
            };

            if let Some(content) = content {
                outputs.push(LayerOutput {
                    folder_name,
                    content,
                });
            }

            progress.progress(index + 1, total);
        }

        if cancel.is_cancelled() {
            log::info!("Export cancelled before packaging");
            return Err(ExportError::Cancelled);
        }

        if outputs.is_empty() {
            return Err(ExportError::NothingExported(report));
        }

        self.set_state(JobState::Packaging);
        let document = self.build_document(&path, &outputs);
        let images: Vec<_> = outputs
            .iter()
            .filter_map(|o| match &o.content {
                LayerContent::Overlay(overlay) => Some(&overlay.image),
                LayerContent::Placemarks(_) => None,
            })
            .collect();
        let path = package(&document, &images, &path, format, &self.options.document_entry)?;

        Ok(ExportSummary {
            path,
            format,
            report,
        })
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigurationError> {
        if self.layers.is_empty() {
            return Err(ConfigurationError::NoLayers);
        }

        if path.as_os_str().is_empty() || path.file_name().is_none() || path.is_dir() {
            return Err(ConfigurationError::InvalidTarget(path.to_path_buf()));
        }

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !directory.is_dir() {
            return Err(ConfigurationError::MissingDirectory(directory.to_path_buf()));
        }

        tempfile::Builder::new()
            .prefix(".export2kml-probe")
            .tempfile_in(directory)
            .map_err(|source| ConfigurationError::NotWritable {
                path: directory.to_path_buf(),
                source,
            })?;

        Ok(())
    }

    fn build_document(&self, path: &Path, outputs: &[LayerOutput]) -> KmlDocument {
        let name = self.options.document_name.clone().or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        });
        let mut document = KmlDocument::new(name.as_deref());

        for output in outputs {
            if self.options.group_by_layer {
                document.begin_folder(&output.folder_name);
            }

            match &output.content {
                LayerContent::Placemarks(placemarks) => {
                    for placemark in placemarks {
                        document.add_placemark(placemark);
                    }
                }
                LayerContent::Overlay(overlay) => document.add_overlay(overlay),
            }

            document.end_folder();
        }

        document
    }
}

/// Moves a job that did not reach a final state into [`JobState::Failed`], so that a panic in a layer or a
/// renderer does not leave the job marked as running.
struct RunGuard<'a> {
    state: &'a Mutex<JobState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.is_running() {
            *state = JobState::Failed;
        }
    }
}

fn process_vector(
    layer: &dyn VectorLayer,
    mapping: &FieldMapping,
    context: &LayerContext,
    report: &mut ExportReport,
) -> Option<LayerContent> {
    let name = layer.name();
    let translation = match translate(layer, mapping, context) {
        Ok(translation) => translation,
        Err(err) => {
            let err = LayerError::from(err);
            log::warn!("Layer {name} is skipped: {err}");
            report.push(LayerReport::failed(name, &err, vec![]));
            return None;
        }
    };

    let mut placemarks = vec![];
    let mut issues: Vec<FeatureIssue> = vec![];
    for result in translation {
        match result {
            Ok(placemark) => placemarks.push(placemark),
            Err(FeatureError::Skipped(issue)) => {
                log::warn!("Layer {name}: {}", issue.message);
                issues.push(issue);
            }
            Err(FeatureError::Projection(err)) => {
                let err = LayerError::from(err);
                log::warn!("Layer {name} is skipped: {err}");
                report.push(LayerReport::failed(name, &err, issues));
                return None;
            }
        }
    }

    let message = if issues.is_empty() {
        format!("exported {} placemark(s)", placemarks.len())
    } else {
        format!(
            "exported {} placemark(s), {} feature(s) skipped",
            placemarks.len(),
            issues.len()
        )
    };
    log::info!("Layer {name}: {message}");
    report.push(LayerReport::exported(name, message, issues));

    Some(LayerContent::Placemarks(placemarks))
}

fn process_raster(
    layer: &dyn RasterLayer,
    mapping: &FieldMapping,
    context: &LayerContext,
    rasterizer: &Rasterizer,
    workspace: &mut Workspace,
    report: &mut ExportReport,
) -> Option<LayerContent> {
    let name = layer.name();
    match rasterizer.render(layer, mapping, context, workspace) {
        Ok(output) => {
            let message = format!("exported overlay {}", output.overlay.image.archive_path);
            log::info!("Layer {name}: {message}");
            report.push(LayerReport::exported(name, message, output.issues));
            Some(LayerContent::Overlay(output.overlay))
        }
        Err(err) => {
            log::warn!("Layer {name} is skipped: {err}");
            report.push(LayerReport::failed(name, &err, vec![]));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;
    use crate::layer::{MemoryVectorLayer, SourceFeature};
    use crate::mapping::KmlProperty;
    use crate::report::LayerStatus;
    use crate::tests::{elevation_raster, parse_xml, roads_layer};
    use assert_matches::assert_matches;
    use export2kml_types::cartesian::Point2d;
    use export2kml_types::geo::Crs;
    use std::cell::{Cell, RefCell};
    use std::io::Read;

    fn no_progress(_: usize, _: usize) {}

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn not_cancelled() -> bool {
        false
    }

    fn roads_mapping() -> FieldMapping {
        FieldMapping::new().with_attribute(KmlProperty::Name, "street_name")
    }

    fn read_kmz(path: &Path) -> (Vec<String>, String) {
        let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        let names = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        let mut document = String::new();
        archive
            .by_name("doc.kml")
            .unwrap()
            .read_to_string(&mut document)
            .unwrap();
        (names, document)
    }

    #[test]
    fn vector_layer_to_kml() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("roads.kml");
        let job = ExportJob::new(&target, OutputFormat::Kml)
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping());

        let summary = job.run(&no_progress, &not_cancelled).unwrap();
        assert_eq!(summary.path, target);
        assert_eq!(summary.format, OutputFormat::Kml);
        assert_eq!(summary.report.layers()[0].status, LayerStatus::Success);
        assert_eq!(job.state(), JobState::Done);

        let tree = parse_xml(&std::fs::read_to_string(&target).unwrap());
        let document = tree.child("Document").unwrap();
        assert_eq!(document.child_text("name"), Some("roads"));
        let folder = document.child("Folder").unwrap();
        assert_eq!(folder.child_text("name"), Some("Roads"));
        let names: Vec<_> = folder
            .children_named("Placemark")
            .map(|p| p.child_text("name").unwrap())
            .collect();
        assert_eq!(names, vec!["Main St", "Oak Ave", "Pine Rd"]);
    }

    #[test]
    fn raster_forces_kmz() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("export.kml");
        let job = ExportJob::new(&target, OutputFormat::Kml)
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping())
            .with_layer(LayerRef::raster(elevation_raster()), FieldMapping::new());

        assert_eq!(job.effective_format(), OutputFormat::Kmz);
        let summary = job.run(&no_progress, &not_cancelled).unwrap();
        assert_eq!(summary.format, OutputFormat::Kmz);
        assert_eq!(summary.path, dir.path().join("export.kmz"));
        assert!(!target.exists());

        let (entries, document) = read_kmz(&summary.path);
        assert_eq!(entries, vec!["doc.kml", "rasters/Elevation.png"]);

        let tree = parse_xml(&document);
        let folders: Vec<_> = tree.child("Document").unwrap().children_named("Folder").collect();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].children_named("Placemark").count(), 3);
        let overlay = folders[1].child("GroundOverlay").unwrap();
        assert_eq!(overlay.path(&["Icon", "href"]).unwrap().text, "rasters/Elevation.png");
        assert_eq!(overlay.path(&["LatLonBox", "west"]).unwrap().text, "10");
    }

    #[test]
    fn repeated_runs_give_identical_output() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("export.kmz");
        let job = ExportJob::new(&target, OutputFormat::Kmz)
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping())
            .with_layer(LayerRef::raster(elevation_raster()), FieldMapping::new());

        job.run(&no_progress, &not_cancelled).unwrap();
        let first = std::fs::read(&target).unwrap();
        job.run(&no_progress, &not_cancelled).unwrap();
        let second = std::fs::read(&target).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cancellation_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let target = dir.path().join("export.kmz");
        let options = ExportOptions {
            temp_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let job = ExportJob::new(&target, OutputFormat::Kmz)
            .with_options(options)
            .with_layer(LayerRef::raster(elevation_raster()), FieldMapping::new())
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping());

        let cancel = AtomicBool::new(false);
        let processed = Cell::new(0);
        let progress = |done: usize, _: usize| {
            processed.set(done);
            cancel.store(true, Ordering::Relaxed);
        };

        assert_matches!(job.run(&progress, &cancel), Err(ExportError::Cancelled));
        assert_eq!(processed.get(), 1);
        assert_eq!(job.state(), JobState::Failed);
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn progress_is_reported_per_layer() {
        let dir = tempfile::tempdir().unwrap();
        let job = ExportJob::new(dir.path().join("out.kmz"), OutputFormat::Kmz)
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping())
            .with_layer(LayerRef::raster(elevation_raster()), FieldMapping::new());

        let calls = RefCell::new(vec![]);
        let progress = |done: usize, total: usize| calls.borrow_mut().push((done, total));
        job.run(&progress, &not_cancelled).unwrap();
        assert_eq!(calls.into_inner(), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn failed_layer_is_reported() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let swiss = MemoryVectorLayer::new("Swiss", Crs::from_epsg(2056))
            .with_feature(SourceFeature::new(Point2d::new(2_600_000.0, 1_200_000.0)));
        let job = ExportJob::new(dir.path().join("out.kml"), OutputFormat::Kml)
            .with_layer(LayerRef::vector(swiss), FieldMapping::new())
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping());

        let summary = job.run(&no_progress, &not_cancelled).unwrap();
        let report = &summary.report;
        assert_eq!(report.layers().len(), 2);
        assert_eq!(report.layer("Swiss").unwrap().status, LayerStatus::Error);
        assert_eq!(report.layer("Roads").unwrap().status, LayerStatus::Success);

        let tree = parse_xml(&std::fs::read_to_string(&summary.path).unwrap());
        assert_eq!(tree.child("Document").unwrap().children_named("Folder").count(), 1);
    }

    #[test]
    fn skipped_features_give_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut roads = roads_layer();
        roads.push(SourceFeature::default().with_attribute("street_name", "Ghost Ln"));
        let job = ExportJob::new(dir.path().join("out.kml"), OutputFormat::Kml)
            .with_layer(LayerRef::vector(roads), roads_mapping());

        let summary = job.run(&no_progress, &not_cancelled).unwrap();
        let layer = &summary.report.layers()[0];
        assert_eq!(layer.status, LayerStatus::Warning);
        assert_eq!(layer.issues.len(), 1);
        assert_eq!(layer.issues[0].feature_id, "3");
    }

    #[test]
    fn nothing_exported() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.kml");
        let job = ExportJob::new(&target, OutputFormat::Kml).with_layer(
            LayerRef::vector(MemoryVectorLayer::new("Swiss", Crs::from_epsg(2056))),
            FieldMapping::new(),
        );

        let Err(ExportError::NothingExported(report)) = job.run(&no_progress, &not_cancelled) else {
            panic!("export should fail");
        };
        assert_eq!(report.layers()[0].status, LayerStatus::Error);
        assert!(!target.exists());
    }

    #[test]
    fn empty_vector_layer_is_exported() {
        let dir = tempfile::tempdir().unwrap();
        let job = ExportJob::new(dir.path().join("out.kml"), OutputFormat::Kml).with_layer(
            LayerRef::vector(MemoryVectorLayer::new("Empty", Crs::WGS84)),
            FieldMapping::new(),
        );

        let summary = job.run(&no_progress, &not_cancelled).unwrap();
        assert_eq!(summary.report.layers()[0].status, LayerStatus::Success);
        let tree = parse_xml(&std::fs::read_to_string(&summary.path).unwrap());
        assert!(tree.path(&["Document", "Folder"]).is_some());
    }

    #[test]
    fn configuration_errors() {
        let dir = tempfile::tempdir().unwrap();

        let job = ExportJob::new(dir.path().join("out.kml"), OutputFormat::Kml);
        assert_matches!(
            job.run(&no_progress, &not_cancelled),
            Err(ExportError::Configuration(ConfigurationError::NoLayers))
        );

        let job = ExportJob::new(dir.path().join("missing/out.kml"), OutputFormat::Kml)
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping());
        assert_matches!(
            job.run(&no_progress, &not_cancelled),
            Err(ExportError::Configuration(ConfigurationError::MissingDirectory(_)))
        );

        let job = ExportJob::new(dir.path(), OutputFormat::Kml)
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping());
        assert_matches!(
            job.run(&no_progress, &not_cancelled),
            Err(ExportError::Configuration(ConfigurationError::InvalidTarget(_)))
        );
        assert_eq!(job.state(), JobState::Failed);
    }

    #[test]
    fn running_job_cannot_be_started_again() {
        let dir = tempfile::tempdir().unwrap();
        let job = ExportJob::new(dir.path().join("out.kml"), OutputFormat::Kml)
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping());

        let nested = RefCell::new(None);
        let progress = |_: usize, _: usize| {
            *nested.borrow_mut() = Some(job.run(&no_progress, &not_cancelled));
        };
        job.run(&progress, &not_cancelled).unwrap();

        assert_matches!(nested.into_inner(), Some(Err(ExportError::ConcurrentJob)));
        assert_eq!(job.state(), JobState::Done);
    }

    #[test]
    fn ungrouped_layers() {
        let dir = tempfile::tempdir().unwrap();
        let options = ExportOptions {
            group_by_layer: false,
            document_name: Some("My export".into()),
            ..Default::default()
        };
        let job = ExportJob::new(dir.path().join("out.kml"), OutputFormat::Kml)
            .with_options(options)
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping());

        let summary = job.run(&no_progress, &not_cancelled).unwrap();
        let tree = parse_xml(&std::fs::read_to_string(&summary.path).unwrap());
        let document = tree.child("Document").unwrap();
        assert_eq!(document.child_text("name"), Some("My export"));
        assert!(document.child("Folder").is_none());
        assert_eq!(document.children_named("Placemark").count(), 3);
    }

    #[test]
    fn invalid_timestamp_skips_only_that_feature() {
        let dir = tempfile::tempdir().unwrap();
        let landmark = |x: f64, built: &str| SourceFeature::new(Point2d::new(x, 50.0)).with_attribute("built", built);
        let landmarks = MemoryVectorLayer::new("Landmarks", Crs::WGS84)
            .with_feature(landmark(10.0, "1999-05-01"))
            .with_feature(landmark(10.1, "yesterday"))
            .with_feature(landmark(10.2, "2001"));
        let mapping = FieldMapping::new().with_attribute(KmlProperty::Timestamp, "built");
        let job = ExportJob::new(dir.path().join("out.kml"), OutputFormat::Kml)
            .with_layer(LayerRef::vector(landmarks), mapping);

        let summary = job.run(&no_progress, &not_cancelled).unwrap();
        let layer = &summary.report.layers()[0];
        assert_eq!(layer.status, LayerStatus::Warning);
        assert_eq!(layer.issues.len(), 1);
        let issue = &layer.issues[0];
        assert_eq!(issue.kind, crate::report::IssueKind::FieldMapping);
        assert_eq!(issue.feature_id, "1");
        assert!(issue.message.contains("feature 1"), "{}", issue.message);
        assert!(issue.message.contains("\"built\""), "{}", issue.message);

        let tree = parse_xml(&std::fs::read_to_string(&summary.path).unwrap());
        let placemarks: Vec<_> = tree
            .path(&["Document", "Folder"])
            .unwrap()
            .children_named("Placemark")
            .collect();
        let times: Vec<_> = placemarks
            .iter()
            .map(|p| p.path(&["TimeStamp", "when"]).unwrap().text.as_str())
            .collect();
        assert_eq!(times, vec!["1999-05-01", "2001"]);
    }

    #[test]
    fn ids_are_unique_across_layers() {
        let dir = tempfile::tempdir().unwrap();
        let job = ExportJob::new(dir.path().join("out.kmz"), OutputFormat::Kmz)
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping())
            .with_layer(LayerRef::vector(roads_layer()), roads_mapping())
            .with_layer(LayerRef::raster(elevation_raster()), FieldMapping::new())
            .with_layer(LayerRef::raster(elevation_raster()), FieldMapping::new());

        let summary = job.run(&no_progress, &not_cancelled).unwrap();
        let (entries, document) = read_kmz(&summary.path);
        assert_eq!(
            entries,
            vec!["doc.kml", "rasters/Elevation.png", "rasters/Elevation_2.png"]
        );

        let tree = parse_xml(&document);
        let folders: Vec<_> = tree.child("Document").unwrap().children_named("Folder").collect();
        let mut ids: Vec<&str> = folders
            .iter()
            .flat_map(|f| f.children.iter())
            .filter_map(|node| node.attribute("id"))
            .collect();
        assert_eq!(ids.len(), 8);
        assert!(ids.contains(&"roads.0"));
        assert!(ids.contains(&"roads_2.0"));
        assert!(ids.contains(&"elevation"));
        assert!(ids.contains(&"elevation_2"));

        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn panic_does_not_leave_job_running() {
        struct FlakyLayer {
            crs: Crs,
            failed: AtomicBool,
        }

        impl VectorLayer for FlakyLayer {
            fn name(&self) -> &str {
                "Flaky"
            }
            fn crs(&self) -> &Crs {
                &self.crs
            }
            fn field_names(&self) -> Vec<String> {
                vec![]
            }
            fn features(&self) -> Box<dyn Iterator<Item = SourceFeature> + '_> {
                if !self.failed.swap(true, Ordering::Relaxed) {
                    panic!("source is not available");
                }
                Box::new(std::iter::empty())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let layer = FlakyLayer {
            crs: Crs::WGS84,
            failed: AtomicBool::new(false),
        };
        let job = ExportJob::new(dir.path().join("out.kml"), OutputFormat::Kml)
            .with_layer(LayerRef::vector(layer), FieldMapping::new());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            job.run(&no_progress, &not_cancelled)
        }));
        assert!(result.is_err());
        assert_eq!(job.state(), JobState::Failed);

        job.run(&no_progress, &not_cancelled).unwrap();
        assert_eq!(job.state(), JobState::Done);
    }
}
