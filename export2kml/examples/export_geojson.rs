//! This example exports GeoJSON files into a single KMZ file, with a small synthetic elevation raster as a ground
//! overlay.
//!
//! Every file becomes a folder. Features are named after their `name` attribute (or their id if there is no such
//! attribute), get a timestamp from the `built` attribute and carry `kind` in their extended data.
//!
//! ```shell
//! cargo run --example export_geojson --features geojson -- out.kmz "./export2kml/examples/data/landmarks.geojson"
//! ```

use anyhow::{anyhow, Result};
use export2kml::export2kml_types::cartesian::Size;
use export2kml::export2kml_types::geo::Crs;
use export2kml::layer::VectorLayer;
use export2kml::render::{ColorRamp, GridRaster, RasterStyle};
use export2kml::{
    Color, Computed, ExportJob, FieldMapping, GeoJsonLayer, GeoTransform, KmlProperty, LayerRef, MappingValue,
    OutputFormat, RasterGrid,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let target = args
        .next()
        .ok_or_else(|| anyhow!("usage: export_geojson <output.kmz> <file.geojson>..."))?;
    let sources: Vec<String> = args.collect();
    if sources.is_empty() {
        return Err(anyhow!("at least one .geojson file must be given"));
    }

    let mut job = ExportJob::new(&target, OutputFormat::Kmz);
    for source in &sources {
        let layer = GeoJsonLayer::from_path(source)?;
        let fields = layer.field_names();
        let has_field = |name: &str| fields.iter().any(|f| f == name);
        let entries = [(KmlProperty::Name, "name"), (KmlProperty::Timestamp, "built")]
            .into_iter()
            .filter(|(_, field)| has_field(*field));

        let mut mapping = FieldMapping::from_text(entries, &fields).with_extended_field("kind");
        if !has_field("name") {
            mapping.set(KmlProperty::Name, MappingValue::Computed(Computed::FeatureId));
        }

        job = job.with_layer(LayerRef::vector(layer), mapping);
    }

    job = job.with_layer(
        LayerRef::raster(elevation()?),
        FieldMapping::new()
            .with_literal(KmlProperty::DrawOrder, "1")
            .with_literal(KmlProperty::Visibility, "0"),
    );

    let summary = job.run(
        &|done: usize, total: usize| log::info!("Processed {done} of {total} layers"),
        &|| false,
    )?;

    println!("Written {}", summary.path.display());
    print!("{}", summary.report);
    println!("{}", serde_json::to_string_pretty(&summary.report)?);

    Ok(())
}

/// A smooth 64x64 hill around Berlin.
fn elevation() -> Result<GridRaster> {
    let size = Size::new(64, 64);
    let grid = RasterGrid::new(size, GeoTransform::north_up(13.2, 52.6, 0.005, 0.003));
    let values = (0..64)
        .flat_map(|row| {
            (0..64).map(move |col| {
                let dx = col as f64 - 32.0;
                let dy = row as f64 - 32.0;
                100.0 * (-(dx * dx + dy * dy) / 400.0).exp()
            })
        })
        .collect();

    let style = RasterStyle::new(ColorRamp::linear(0.0, Color::BLUE, 100.0, Color::RED)).with_opacity(0.6);
    Ok(GridRaster::new("Elevation", Crs::WGS84, grid, values, style)?)
}
