//! Tag classification into [`SemanticType`].
//!
//! Tags are visited in order and a later matching tag overrides an earlier
//! one. `boundary=administrative` only yields a type together with a known
//! `admin_level`, and a road tagged `area=yes` becomes a plaza.

use crate::model::SemanticType::{self, *};

/// `(key, values, type)`: the type a tag yields when its value is listed.
const VALUES: &[(&str, &[&str], SemanticType)] = &[
    (
        "building",
        &["detached", "hut", "house", "bungalow", "shed", "cabin", "garage", "kiosk"],
        Detached,
    ),
    ("highway", &["primary", "secondary", "motorway", "trunk"], LargeRoad),
    (
        "highway",
        &["path", "footway", "pedestrian", "steps", "track", "cycleway", "bridleway"],
        Path,
    ),
    ("highway", &["living_street", "residential", "unclassified", "service"], SmallRoad),
    (
        "landuse",
        &[
            "vineyard",
            "village_green",
            "grass",
            "meadow",
            "greenfield",
            "recreation_ground",
            "allotment",
        ],
        GreenLand,
    ),
    ("landuse", &["forest", "orchard"], Forest),
    ("landuse", &["farmland"], FarmLand),
    ("landuse", &["basin", "reservior"], Water),
    ("landuse", &["brownfield", "landfill", "construction", "farmyard"], BareLand),
    ("landuse", &["cemetery"], Graveyard),
    ("landuse", &["industrial", "port", "railway"], Industry),
    ("landuse", &["residential", "garages", "retail", "commercial"], Residential),
    ("natural", &["wood"], Forest),
    ("natural", &["grassland", "scrub"], GreenLand),
    ("natural", &["water", "wetland", "bay", "glacier", "hot_spring"], Water),
    (
        "natural",
        &["bare_rock", "scree", "shingle", "sand", "beach", "fell", "heath", "moor"],
        BareLand,
    ),
    ("natural", &["tree_row"], TreeRow),
    ("natural", &["coastline"], Coast),
    ("amenity", &["grave_yard"], Graveyard),
    ("amenity", &["university", "school", "college", "kindergarten"], Residential),
    ("waterway", &["riverbank", "dock"], Water),
    ("waterway", &["river", "stream", "canal", "drain", "ditch"], Waterway),
    ("type", &["waterway"], Waterway),
    ("type", &["street"], Street),
    (
        "leisure",
        &[
            "garden",
            "park",
            "nature_reserve",
            "track",
            "golf_course",
            "pitch",
            "dog_park",
            "miniature_golf",
        ],
        GreenLand,
    ),
    ("leisure", &["common"], BareLand),
    ("leisure", &["bird_hide", "bandstand"], Detached),
    ("border_type", &["township", "city", "village"], City),
    ("border_type", &["state", "province"], State),
];

/// Type for a key whose value is not listed in [`VALUES`].
const FALLBACK: &[(&str, SemanticType)] = &[
    ("building", Apartments),
    ("highway", MiddleRoad),
    ("water", Water),
];

/// Administrative border level from `admin_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Border {
    Nation,
    State,
    City,
}

/// Classify a way or relation by its tags.
pub fn classify<'a, I>(tags: I) -> SemanticType
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut kind = None;
    let mut border: Option<Border> = Option::None;
    let mut is_area = false;
    let mut tagged = false;

    for (key, value) in tags {
        tagged = true;
        match key {
            "area" if value == "yes" => is_area = true,
            "boundary" if value == "administrative" => kind = Boundary,
            "admin_level" => match value.trim().parse::<i32>() {
                Ok(2) => border = Some(Border::Nation),
                Ok(4) => border = Some(Border::State),
                Ok(6..=8) => border = Some(Border::City),
                _ => kind = None,
            },
            _ => {
                if let Some(&(_, _, t)) = VALUES
                    .iter()
                    .find(|(k, values, _)| *k == key && values.contains(&value))
                {
                    kind = t;
                } else if let Some(&(_, t)) = FALLBACK.iter().find(|(k, _)| *k == key) {
                    kind = t;
                }
            }
        }
    }

    if !tagged {
        return Empty;
    }
    if kind == Boundary {
        return match border {
            Some(Border::Nation) => Nation,
            Some(Border::State) => State,
            Some(Border::City) => City,
            Option::None => None,
        };
    }
    if is_area && kind.is_road() {
        kind = Plaza;
    }
    if kind == None {
        Empty
    } else {
        kind
    }
}

/// Relations of untyped or road class are not kept.
pub fn classify_relation<'a, I>(tags: I) -> SemanticType
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    match classify(tags) {
        Empty | Path | SmallRoad | MiddleRoad | LargeRoad => None,
        kind => kind,
    }
}

/// Single-point objects: trees and street lamps.
pub fn classify_single<'a, I>(tags: I) -> Option<SemanticType>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    tags.into_iter().find_map(|tag| match tag {
        ("natural", "tree") => Some(Tree),
        ("highway", "street_lamp") => Some(Lamp),
        _ => Option::None,
    })
}
