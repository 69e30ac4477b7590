//! Fixtures shared by the unit tests.

use export2kml_types::cartesian::{Point2d, Size};
use export2kml_types::geo::Crs;
use export2kml_types::impls::Contour;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::adapter::GeoBox;
use crate::color::Color;
use crate::layer::{GeoTransform, MemoryVectorLayer, RasterGrid, SourceFeature};
use crate::mapping::ResolvedProperties;
use crate::raster::{OverlayImage, OverlayRecord};
use crate::render::{ColorRamp, GridRaster, RasterStyle};

pub const NODATA: f64 = -9999.0;

/// Three line features with a `street_name` attribute.
pub fn roads_layer() -> MemoryVectorLayer {
    let road = |name: &str, lanes: i64, points: &[(f64, f64)]| {
        SourceFeature::new(Contour::open(
            points.iter().map(|(x, y)| Point2d::new(*x, *y)).collect(),
        ))
        .with_attribute("street_name", name)
        .with_attribute("lanes", lanes)
    };

    MemoryVectorLayer::new("Roads", Crs::WGS84)
        .with_feature(road("Main St", 2, &[(10.0, 50.0), (10.1, 50.1)]))
        .with_feature(road("Oak Ave", 1, &[(10.2, 50.0), (10.2, 50.3), (10.4, 50.3)]))
        .with_feature(road("Pine Rd", 4, &[(10.5, 49.8), (10.6, 49.9)]))
}

/// 4x2 geographic raster covering 10..11 E, 49.5..50 N. The top left cell has no data.
pub fn elevation_raster() -> GridRaster {
    let grid = RasterGrid::new(Size::new(4, 2), GeoTransform::north_up(10.0, 50.0, 0.25, 0.25));
    let values = vec![NODATA, 100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0];
    let style = RasterStyle::new(ColorRamp::linear(0.0, Color::BLUE, 1000.0, Color::RED));

    GridRaster::new("Elevation", Crs::WGS84, grid, values, style)
        .expect("valid raster")
        .with_nodata(NODATA)
}

pub fn overlay_record(href: &str) -> OverlayRecord {
    OverlayRecord {
        id: "overlay".into(),
        name: "Overlay".into(),
        image: OverlayImage {
            archive_path: href.to_string(),
            file: href.into(),
            size: Size::new(1, 1),
        },
        bbox: GeoBox {
            north: 1.0,
            south: 0.0,
            east: 1.0,
            west: 0.0,
        },
        rotation: 0.0,
        properties: ResolvedProperties::default(),
    }
}

/// Parsed XML element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_start(start: &BytesStart) -> Self {
        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes: start
                .attributes()
                .map(|a| {
                    let a = a.expect("valid attribute");
                    (
                        String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                        a.unescape_value().expect("valid value").into_owned(),
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    pub fn path(&self, names: &[&str]) -> Option<&XmlNode> {
        names.iter().try_fold(self, |node, name| node.child(name))
    }
}

/// Parses an XML document into a tree. Panics if the document is not well-formed.
pub fn parse_xml(text: &str) -> XmlNode {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut stack: Vec<XmlNode> = vec![];
    loop {
        match reader.read_event().expect("well-formed XML") {
            Event::Start(start) => stack.push(XmlNode::from_start(&start)),
            Event::Empty(start) => {
                let node = XmlNode::from_start(&start);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return node,
                }
            }
            Event::Text(text) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text.unescape().expect("valid text"));
                }
            }
            Event::End(_) => {
                let node = stack.pop().expect("matching start tag");
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return node,
                }
            }
            Event::Eof => panic!("unexpected end of document"),
            _ => {}
        }
    }
}
