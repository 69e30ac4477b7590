//! KML document model and serialization.
//!
//! [`KmlDocument`] collects placemarks and ground overlays in the order they are added, optionally grouped into
//! folders, and serializes them into a KML 2.2 document.

use std::io::Write;

use export2kml_types::geo::{GeoPoint, GeoPoint2d};
use export2kml_types::impls::{Contour, Polygon};
use export2kml_types::Geom;
use quick_xml::events::{BytesDecl, Event};
use quick_xml::Writer;

use crate::error::PackagingError;
use crate::mapping::{AltitudeMode, KmlProperty, KmlTime, ResolvedProperties};
use crate::raster::OverlayRecord;
use crate::translate::PlacemarkRecord;

mod element;

pub use element::{Element, Node};

/// Namespace of KML 2.2 documents.
pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

/// KML document under construction.
#[derive(Debug, Clone)]
pub struct KmlDocument {
    document: Element,
    open_folder: Option<Element>,
    overlay_hrefs: Vec<String>,
}

impl KmlDocument {
    /// Creates an empty document.
    pub fn new(name: Option<&str>) -> Self {
        let mut document = Element::new("Document");
        if let Some(name) = name {
            document.push_text("name", name);
        }

        Self {
            document,
            open_folder: None,
            overlay_hrefs: vec![],
        }
    }

    /// Starts a folder. Everything added until [`KmlDocument::end_folder`] is put into it.
    pub fn begin_folder(&mut self, name: &str) {
        self.end_folder();
        self.open_folder = Some(Element::text("name", name).wrap_in("Folder"));
    }

    /// Closes the current folder, if any.
    pub fn end_folder(&mut self) {
        if let Some(folder) = self.open_folder.take() {
            self.document.push(folder);
        }
    }

    /// Adds a placemark.
    pub fn add_placemark(&mut self, record: &PlacemarkRecord) {
        let placemark = placemark_element(record);
        self.container().push(placemark);
    }

    /// Adds a ground overlay.
    pub fn add_overlay(&mut self, record: &OverlayRecord) {
        self.overlay_hrefs.push(record.image.archive_path.clone());
        let overlay = overlay_element(record);
        self.container().push(overlay);
    }

    /// Image paths referenced by the overlays, in the document order.
    pub fn overlay_hrefs(&self) -> &[String] {
        &self.overlay_hrefs
    }

    /// Writes the document as UTF-8 encoded XML.
    pub fn write_to<W: Write>(&self, inner: W) -> Result<(), PackagingError> {
        let mut writer = Writer::new_with_indent(inner, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut document = self.document.clone();
        if let Some(folder) = &self.open_folder {
            document.push(folder.clone());
        }

        Element::new("kml")
            .with_attribute("xmlns", KML_NAMESPACE)
            .with_child(document)
            .write(&mut writer)
    }

    /// Serializes the document.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PackagingError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }

    fn container(&mut self) -> &mut Element {
        self.open_folder.as_mut().unwrap_or(&mut self.document)
    }
}

impl Element {
    fn wrap_in(self, name: &'static str) -> Element {
        Element::new(name).with_child(self)
    }
}

fn push_common(element: &mut Element, properties: &ResolvedProperties) {
    if let Some(visibility) = properties.text(KmlProperty::Visibility) {
        element.push_text("visibility", visibility);
    }
    if let Some(description) = properties.text(KmlProperty::Description) {
        element.push_text("description", description);
    }
    if let Some(time) = time_primitive(properties) {
        element.push(time);
    }
}

fn time_primitive(properties: &ResolvedProperties) -> Option<Element> {
    let begin = properties.time(KmlProperty::Begin);
    let end = properties.time(KmlProperty::End);
    let timestamp = properties.time(KmlProperty::Timestamp);

    if begin.is_some() || end.is_some() {
        if timestamp.is_some() {
            log::debug!("Both timestamp and time span are mapped, the time span is used");
        }

        let mut span = Element::new("TimeSpan");
        let mut push_time = |name, time: Option<KmlTime>| {
            if let Some(time) = time {
                span.push_text(name, time.to_string());
            }
        };
        push_time("begin", begin);
        push_time("end", end);
        return Some(span);
    }

    timestamp.map(|time| Element::text("when", time.to_string()).wrap_in("TimeStamp"))
}

fn placemark_element(record: &PlacemarkRecord) -> Element {
    let properties = &record.properties;
    let mut placemark = Element::new("Placemark").with_attribute("id", &record.id);
    if let Some(name) = properties.text(KmlProperty::Name) {
        placemark.push_text("name", name);
    }
    push_common(&mut placemark, properties);

    if let Some(icon) = properties.text(KmlProperty::Icon) {
        placemark.push(
            Element::text("href", icon)
                .wrap_in("Icon")
                .wrap_in("IconStyle")
                .wrap_in("Style"),
        );
    }

    if !record.extended_data.is_empty() {
        let mut extended = Element::new("ExtendedData");
        for (name, value) in &record.extended_data {
            extended.push(
                Element::new("Data")
                    .with_attribute("name", name)
                    .with_child(Element::text("value", value)),
            );
        }
        placemark.push(extended);
    }

    let mut altitudes = Altitudes(record.altitudes.as_deref().map(|a| a.iter()));
    placemark.push(geometry_element(
        &record.geometry,
        &GeometryOptions::from(properties),
        &mut altitudes,
    ));
    placemark
}

fn overlay_element(record: &OverlayRecord) -> Element {
    let properties = &record.properties;
    let mut overlay = Element::new("GroundOverlay")
        .with_attribute("id", &record.id)
        .with_child(Element::text("name", &record.name));

    if properties.get(KmlProperty::Visibility).is_none() {
        overlay.push_text("visibility", "1");
    }
    push_common(&mut overlay, properties);

    if let Some(order) = properties.text(KmlProperty::DrawOrder) {
        overlay.push_text("drawOrder", order);
    }
    overlay.push(Element::text("href", &record.image.archive_path).wrap_in("Icon"));

    match properties.altitude_mode() {
        Some(mode @ (AltitudeMode::ClampToGround | AltitudeMode::Absolute)) => {
            overlay.push_text("altitudeMode", mode.as_str());
        }
        Some(mode) => log::warn!(
            "Altitude mode {} is not valid for ground overlays and is ignored",
            mode.as_str()
        ),
        None => {}
    }

    let bbox = &record.bbox;
    let mut lat_lon_box = Element::new("LatLonBox");
    lat_lon_box.push_text("north", bbox.north.to_string());
    lat_lon_box.push_text("south", bbox.south.to_string());
    lat_lon_box.push_text("east", bbox.east.to_string());
    lat_lon_box.push_text("west", bbox.west.to_string());
    if record.rotation != 0.0 {
        lat_lon_box.push_text("rotation", record.rotation.to_string());
    }
    overlay.push(lat_lon_box);

    overlay
}

struct GeometryOptions {
    extrude: Option<String>,
    tessellate: Option<String>,
    altitude_mode: Option<String>,
}

impl From<&ResolvedProperties> for GeometryOptions {
    fn from(properties: &ResolvedProperties) -> Self {
        Self {
            extrude: properties.text(KmlProperty::Extrude),
            tessellate: properties.text(KmlProperty::Tessellate),
            altitude_mode: properties.text(KmlProperty::AltitudeMode),
        }
    }
}

impl GeometryOptions {
    fn element(&self, name: &'static str, with_tessellate: bool) -> Element {
        let mut element = Element::new(name);
        if let Some(extrude) = &self.extrude {
            element.push_text("extrude", extrude);
        }
        if with_tessellate {
            if let Some(tessellate) = &self.tessellate {
                element.push_text("tessellate", tessellate);
            }
        }
        if let Some(mode) = &self.altitude_mode {
            element.push_text("altitudeMode", mode);
        }
        element
    }
}

/// Altitudes of the vertices of a placemark, taken in the order the vertices are written.
struct Altitudes<'a>(Option<std::slice::Iter<'a, f64>>);

impl Altitudes<'_> {
    fn next(&mut self) -> Option<f64> {
        self.0.as_mut().and_then(|iter| iter.next().copied())
    }
}

fn geometry_element(geometry: &Geom<GeoPoint2d>, options: &GeometryOptions, z: &mut Altitudes) -> Element {
    match geometry {
        Geom::Point(point) => point_element(point, options, z),
        Geom::MultiPoint(points) => multi_geometry(points.iter().map(|p| point_element(p, options, z))),
        Geom::Contour(contour) => contour_element(contour, options, z),
        Geom::MultiContour(contours) => {
            multi_geometry(contours.iter().map(|c| contour_element(c, options, z)))
        }
        Geom::Polygon(polygon) => polygon_element(polygon, options, z),
        Geom::MultiPolygon(polygons) => {
            multi_geometry(polygons.parts().iter().map(|p| polygon_element(p, options, z)))
        }
    }
}

fn multi_geometry(parts: impl Iterator<Item = Element>) -> Element {
    let mut element = Element::new("MultiGeometry");
    for part in parts {
        element.push(part);
    }
    element
}

fn point_element(point: &GeoPoint2d, options: &GeometryOptions, z: &mut Altitudes) -> Element {
    options
        .element("Point", false)
        .with_child(coordinates(std::slice::from_ref(point), z, false))
}

fn contour_element(contour: &Contour<GeoPoint2d>, options: &GeometryOptions, z: &mut Altitudes) -> Element {
    if contour.is_closed() {
        options
            .element("LinearRing", true)
            .with_child(coordinates(contour, z, true))
    } else {
        options
            .element("LineString", true)
            .with_child(coordinates(contour, z, false))
    }
}

fn polygon_element(polygon: &Polygon<GeoPoint2d>, options: &GeometryOptions, z: &mut Altitudes) -> Element {
    let mut element = options.element("Polygon", true);
    element.push(
        Element::new("LinearRing")
            .with_child(coordinates(&polygon.outer_contour.points, z, true))
            .wrap_in("outerBoundaryIs"),
    );
    for inner in &polygon.inner_contours {
        element.push(
            Element::new("LinearRing")
                .with_child(coordinates(&inner.points, z, true))
                .wrap_in("innerBoundaryIs"),
        );
    }
    element
}

/// `<coordinates>` of the points as `lon,lat[,alt]` tuples. Rings get the first point repeated at the end if
/// they are not explicitly closed.
fn coordinates(points: &[GeoPoint2d], z: &mut Altitudes, ring: bool) -> Element {
    let mut tuples: Vec<String> = points
        .iter()
        .map(|p| match z.next() {
            Some(alt) => format!("{},{},{alt}", p.lon(), p.lat()),
            None => format!("{},{}", p.lon(), p.lat()),
        })
        .collect();

    let open = matches!((points.first(), points.last()), (Some(first), Some(last)) if first != last);
    if ring && points.len() > 1 && open {
        if let Some(first) = tuples.first().cloned() {
            tuples.push(first);
        }
    }

    Element::text("coordinates", tuples.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::GeoBox;
    use crate::mapping::PropertyValue;
    use crate::raster::OverlayImage;
    use crate::tests::{parse_xml, XmlNode};
    use export2kml_types::cartesian::Size;
    use export2kml_types::geo::NewGeoPoint;
    use export2kml_types::impls::ClosedContour;

    fn to_tree(document: &KmlDocument) -> XmlNode {
        let text = String::from_utf8(document.to_bytes().unwrap()).unwrap();
        parse_xml(&text)
    }

    fn point_record(id: &str, name: Option<&str>) -> PlacemarkRecord {
        let mut properties = ResolvedProperties::default();
        if let Some(name) = name {
            properties.insert(KmlProperty::Name, PropertyValue::Text(name.to_string()));
        }
        PlacemarkRecord {
            id: id.to_string(),
            geometry: Geom::Point(GeoPoint2d::latlon(50.5, 10.25)),
            altitudes: None,
            properties,
            extended_data: vec![],
        }
    }

    fn overlay_record() -> OverlayRecord {
        OverlayRecord {
            id: "elevation".into(),
            name: "Elevation".into(),
            image: OverlayImage {
                archive_path: "rasters/Elevation.png".into(),
                file: "Elevation.png".into(),
                size: Size::new(4, 2),
            },
            bbox: GeoBox {
                north: 50.0,
                south: 49.5,
                east: 11.0,
                west: 10.0,
            },
            rotation: 0.0,
            properties: ResolvedProperties::default(),
        }
    }

    #[test]
    fn empty_document() {
        let tree = to_tree(&KmlDocument::new(Some("Export")));
        assert_eq!(tree.name, "kml");
        assert_eq!(tree.attribute("xmlns"), Some(KML_NAMESPACE));
        let document = tree.child("Document").unwrap();
        assert_eq!(document.child_text("name"), Some("Export"));
    }

    #[test]
    fn folders_keep_order() {
        let mut document = KmlDocument::new(None);
        document.begin_folder("Roads");
        document.add_placemark(&point_record("roads.0", Some("Main St")));
        document.add_placemark(&point_record("roads.1", None));
        document.begin_folder("Elevation");
        document.add_overlay(&overlay_record());

        let tree = to_tree(&document);
        let folders: Vec<_> = tree.child("Document").unwrap().children_named("Folder").collect();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].child_text("name"), Some("Roads"));
        assert_eq!(folders[0].children_named("Placemark").count(), 2);
        assert_eq!(folders[1].children_named("GroundOverlay").count(), 1);
        assert_eq!(document.overlay_hrefs(), ["rasters/Elevation.png"]);
    }

    #[test]
    fn placemark_content() {
        let mut record = point_record("roads.0", Some("Main St"));
        record
            .properties
            .insert(KmlProperty::Timestamp, PropertyValue::Time(KmlTime::Year(2020)));
        record
            .properties
            .insert(KmlProperty::Extrude, PropertyValue::Bool(true));
        record
            .properties
            .insert(KmlProperty::Icon, PropertyValue::Text("icons/road.png".into()));
        record.extended_data = vec![("lanes".into(), "2".into())];

        let mut document = KmlDocument::new(None);
        document.add_placemark(&record);
        let tree = to_tree(&document);
        let placemark = tree.child("Document").unwrap().child("Placemark").unwrap();

        assert_eq!(placemark.attribute("id"), Some("roads.0"));
        assert_eq!(placemark.child_text("name"), Some("Main St"));
        assert_eq!(placemark.child("TimeStamp").unwrap().child_text("when"), Some("2020"));
        assert_eq!(
            placemark.path(&["Style", "IconStyle", "Icon", "href"]).unwrap().text,
            "icons/road.png"
        );
        let data = placemark.path(&["ExtendedData", "Data"]).unwrap();
        assert_eq!(data.attribute("name"), Some("lanes"));
        assert_eq!(data.child_text("value"), Some("2"));

        let point = placemark.child("Point").unwrap();
        assert_eq!(point.child_text("extrude"), Some("1"));
        assert_eq!(point.child_text("coordinates"), Some("10.25,50.5"));
    }

    #[test]
    fn polygon_rings_are_closed() {
        let polygon = Polygon::new(
            ClosedContour::new(vec![
                GeoPoint2d::latlon(0.0, 0.0),
                GeoPoint2d::latlon(0.0, 1.0),
                GeoPoint2d::latlon(1.0, 1.0),
            ]),
            vec![],
        );
        let mut record = point_record("zones.0", None);
        record.geometry = Geom::Polygon(polygon);
        record
            .properties
            .insert(KmlProperty::Tessellate, PropertyValue::Bool(true));

        let mut document = KmlDocument::new(None);
        document.add_placemark(&record);
        let tree = to_tree(&document);
        let polygon = tree.path(&["Document", "Placemark", "Polygon"]).unwrap();
        assert_eq!(polygon.child_text("tessellate"), Some("1"));
        assert_eq!(
            polygon
                .path(&["outerBoundaryIs", "LinearRing", "coordinates"])
                .unwrap()
                .text,
            "0,0 1,0 1,1 0,0"
        );
    }

    #[test]
    fn altitudes_are_written() {
        let polygon = Polygon::new(
            ClosedContour::new(vec![
                GeoPoint2d::latlon(0.0, 0.0),
                GeoPoint2d::latlon(0.0, 1.0),
                GeoPoint2d::latlon(1.0, 1.0),
            ]),
            vec![],
        );
        let mut record = point_record("zones.0", None);
        record.geometry = Geom::Polygon(polygon);
        record.altitudes = Some(vec![10.0, 20.5, 30.0]);
        record.properties.insert(
            KmlProperty::AltitudeMode,
            PropertyValue::AltitudeMode(AltitudeMode::Absolute),
        );

        let mut document = KmlDocument::new(None);
        document.add_placemark(&record);
        let tree = to_tree(&document);
        let polygon = tree.path(&["Document", "Placemark", "Polygon"]).unwrap();
        assert_eq!(polygon.child_text("altitudeMode"), Some("absolute"));
        assert_eq!(
            polygon
                .path(&["outerBoundaryIs", "LinearRing", "coordinates"])
                .unwrap()
                .text,
            "0,0,10 1,0,20.5 1,1,30 0,0,10"
        );
    }

    #[test]
    fn multi_geometry() {
        let mut record = point_record("lines.0", None);
        record.geometry = Geom::MultiContour(
            vec![
                Contour::open(vec![GeoPoint2d::latlon(0.0, 0.0), GeoPoint2d::latlon(1.0, 1.0)]),
                Contour::open(vec![GeoPoint2d::latlon(2.0, 2.0), GeoPoint2d::latlon(3.0, 3.0)]),
            ]
            .into(),
        );

        let mut document = KmlDocument::new(None);
        document.add_placemark(&record);
        let tree = to_tree(&document);
        let multi = tree.path(&["Document", "Placemark", "MultiGeometry"]).unwrap();
        assert_eq!(multi.children_named("LineString").count(), 2);
    }

    #[test]
    fn overlay_content() {
        let mut record = overlay_record();
        record.rotation = 12.5;
        record
            .properties
            .insert(KmlProperty::DrawOrder, PropertyValue::Integer(2));
        record.properties.insert(
            KmlProperty::AltitudeMode,
            PropertyValue::AltitudeMode(AltitudeMode::RelativeToGround),
        );

        let mut document = KmlDocument::new(None);
        document.add_overlay(&record);
        let tree = to_tree(&document);
        let overlay = tree.path(&["Document", "GroundOverlay"]).unwrap();
        assert_eq!(overlay.child_text("name"), Some("Elevation"));
        assert_eq!(overlay.child_text("visibility"), Some("1"));
        assert_eq!(overlay.child_text("drawOrder"), Some("2"));
        assert_eq!(overlay.child_text("altitudeMode"), None);
        assert_eq!(overlay.path(&["Icon", "href"]).unwrap().text, "rasters/Elevation.png");

        let lat_lon_box = overlay.child("LatLonBox").unwrap();
        assert_eq!(lat_lon_box.child_text("north"), Some("50"));
        assert_eq!(lat_lon_box.child_text("south"), Some("49.5"));
        assert_eq!(lat_lon_box.child_text("east"), Some("11"));
        assert_eq!(lat_lon_box.child_text("west"), Some("10"));
        assert_eq!(lat_lon_box.child_text("rotation"), Some("12.5"));
    }

    #[test]
    fn time_span_wins_over_timestamp() {
        let mut record = point_record("a.0", None);
        record
            .properties
            .insert(KmlProperty::Timestamp, PropertyValue::Time(KmlTime::Year(2000)));
        record
            .properties
            .insert(KmlProperty::Begin, PropertyValue::Time(KmlTime::YearMonth(2001, 2)));

        let mut document = KmlDocument::new(None);
        document.add_placemark(&record);
        let tree = to_tree(&document);
        let placemark = tree.path(&["Document", "Placemark"]).unwrap();
        assert!(placemark.child("TimeStamp").is_none());
        let span = placemark.child("TimeSpan").unwrap();
        assert_eq!(span.child_text("begin"), Some("2001-02"));
        assert_eq!(span.child_text("end"), None);
    }
}
