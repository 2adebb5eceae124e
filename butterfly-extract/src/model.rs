//! Entity model: arena-indexed nodes, ways and relations, plus the
//! value-embedding pending forms used while references are unresolved.

use std::fmt;

use butterfly_geometry::kernel::{is_counter_clockwise, polygon_area};
use butterfly_geometry::{Vec2, Vertex};

/// Id of a node that is not part of the input.
pub const INVALID_ID: i64 = -1;
/// Id of a node created on a tile border, or of a way fragment cut from another.
pub const INTERSECTION_ID: i64 = -2;
/// Id of a way absorbed into a neighbour by polygon merging.
pub const MERGED_ID: i64 = -3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub lat: f64,
    pub lon: f64,
    pub id: i64,
}

impl Node {
    pub fn new(id: i64, lat: f64, lon: f64) -> Self {
        Self { lat, lon, id }
    }

    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

impl Vertex for Node {
    fn lat(&self) -> f64 {
        self.lat
    }
    fn lon(&self) -> f64 {
        self.lon
    }
    fn synthetic(lat: f64, lon: f64) -> Self {
        Node::new(INTERSECTION_ID, lat, lon)
    }
    fn is_synthetic(&self) -> bool {
        self.id == INTERSECTION_ID
    }
}

/// Read access to nodes by arena index.
pub trait NodeLookup {
    fn node(&self, index: usize) -> &Node;
}

impl NodeLookup for [Node] {
    fn node(&self, index: usize) -> &Node {
        &self[index]
    }
}

impl NodeLookup for Vec<Node> {
    fn node(&self, index: usize) -> &Node {
        &self[index]
    }
}

/// Semantic class of an entity, serialised as its `i32` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum SemanticType {
    None = 0,
    Empty,
    Apartments,
    Detached,
    Path,
    SmallRoad,
    MiddleRoad,
    LargeRoad,
    Plaza,
    GreenLand,
    FarmLand,
    BareLand,
    Forest,
    Graveyard,
    Boundary,
    City,
    State,
    Nation,
    Water,
    Waterway,
    Coast,
    Industry,
    Residential,
    Tree,
    TreeRow,
    Lamp,
    Street,
}

impl SemanticType {
    const ALL: [SemanticType; 27] = [
        SemanticType::None,
        SemanticType::Empty,
        SemanticType::Apartments,
        SemanticType::Detached,
        SemanticType::Path,
        SemanticType::SmallRoad,
        SemanticType::MiddleRoad,
        SemanticType::LargeRoad,
        SemanticType::Plaza,
        SemanticType::GreenLand,
        SemanticType::FarmLand,
        SemanticType::BareLand,
        SemanticType::Forest,
        SemanticType::Graveyard,
        SemanticType::Boundary,
        SemanticType::City,
        SemanticType::State,
        SemanticType::Nation,
        SemanticType::Water,
        SemanticType::Waterway,
        SemanticType::Coast,
        SemanticType::Industry,
        SemanticType::Residential,
        SemanticType::Tree,
        SemanticType::TreeRow,
        SemanticType::Lamp,
        SemanticType::Street,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn is_area(self) -> bool {
        use SemanticType::*;
        matches!(
            self,
            Apartments
                | Detached
                | GreenLand
                | FarmLand
                | BareLand
                | Water
                | Industry
                | Residential
                | Graveyard
                | Forest
                | Plaza
        )
    }

    pub fn is_house(self) -> bool {
        matches!(self, SemanticType::Apartments | SemanticType::Detached)
    }

    pub fn is_road(self) -> bool {
        use SemanticType::*;
        matches!(self, LargeRoad | MiddleRoad | SmallRoad | Path | Street)
    }

    pub fn is_boundary(self) -> bool {
        matches!(self, SemanticType::Nation | SemanticType::State | SemanticType::City)
    }

    /// Neither unclassified nor untagged.
    pub fn is_drawable(self) -> bool {
        !matches!(self, SemanticType::None | SemanticType::Empty)
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Role of a relation member, serialised as its `i32` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Role {
    Outer = 0,
    Inner = 1,
    MainStream = 2,
    SideStream = 3,
    Street = 4,
}

impl Role {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Role::Outer),
            1 => Some(Role::Inner),
            2 => Some(Role::MainStream),
            3 => Some(Role::SideStream),
            4 => Some(Role::Street),
            _ => None,
        }
    }

    /// Parse a role string as allowed for a relation of type `kind`.
    ///
    /// `inner`/`outer` are always accepted; stream roles only on waterways,
    /// `street` only on street relations. Anything else is corrupt.
    pub fn for_relation(role: &str, kind: SemanticType) -> Option<Self> {
        match role {
            "outer" => Some(Role::Outer),
            "inner" => Some(Role::Inner),
            "main_stream" if kind == SemanticType::Waterway => Some(Role::MainStream),
            "side_stream" if kind == SemanticType::Waterway => Some(Role::SideStream),
            "street" if kind == SemanticType::Street => Some(Role::Street),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Node,
    Way,
    Relation,
}

/// A single-point object such as a tree or a street lamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Single {
    pub node: usize,
    pub kind: SemanticType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: i64,
    pub kind: SemanticType,
    pub refs: Vec<usize>,
    /// Copied in as a member of a promoted relation; not drawn on its own.
    pub member_only: bool,
}

impl Way {
    pub fn new(id: i64, kind: SemanticType, refs: Vec<usize>) -> Self {
        Self {
            id,
            kind,
            refs,
            member_only: false,
        }
    }

    pub fn is_area(&self) -> bool {
        self.kind.is_area()
    }

    /// First and last reference point at the same position.
    pub fn is_closed<N: NodeLookup + ?Sized>(&self, nodes: &N) -> bool {
        match (self.refs.first(), self.refs.last()) {
            (Some(&a), Some(&b)) if self.refs.len() > 1 => {
                a == b || nodes.node(a).pos() == nodes.node(b).pos()
            }
            _ => false,
        }
    }

    /// Areas: at least 4 points and closed. Lines: at least 2 points.
    pub fn satisfies_invariant<N: NodeLookup + ?Sized>(&self, nodes: &N) -> bool {
        if self.is_area() {
            self.refs.len() >= 4 && self.is_closed(nodes)
        } else {
            self.refs.len() >= 2
        }
    }

    pub fn points<N: NodeLookup + ?Sized>(&self, nodes: &N) -> Vec<Vec2> {
        self.refs.iter().map(|&i| nodes.node(i).pos()).collect()
    }

    pub fn area<N: NodeLookup + ?Sized>(&self, nodes: &N) -> f64 {
        if !self.is_area() {
            return 0.0;
        }
        polygon_area(&self.points(nodes))
    }

    pub fn make_clockwise<N: NodeLookup + ?Sized>(&mut self, nodes: &N) {
        if is_counter_clockwise(&self.points(nodes)) {
            self.refs.reverse();
        }
    }

    /// Drop consecutive points at the same position; areas are re-closed.
    pub fn remove_duplicates<N: NodeLookup + ?Sized>(&mut self, nodes: &N) {
        self.refs
            .dedup_by(|b, a| nodes.node(*a).pos() == nodes.node(*b).pos());
        if self.is_area() {
            if let (Some(&first), Some(&last)) = (self.refs.first(), self.refs.last()) {
                if self.refs.len() > 1 && nodes.node(first).pos() != nodes.node(last).pos() {
                    self.refs.push(first);
                } else if self.refs.len() == 1 {
                    self.refs.push(first);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Member {
    pub index: usize,
    pub kind: MemberKind,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: i64,
    pub kind: SemanticType,
    pub members: Vec<Member>,
    /// Copied in as a member of a promoted relation; not drawn on its own.
    pub member_only: bool,
}

impl Relation {
    pub fn new(id: i64, kind: SemanticType, members: Vec<Member>) -> Self {
        Self {
            id,
            kind,
            members,
            member_only: false,
        }
    }
}

/// A reference that is either resolved to a value or still only an id.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    Resolved(T),
    Missing(i64),
}

impl<T> Slot<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Slot::Missing(_))
    }

    pub fn resolved(&self) -> Option<&T> {
        match self {
            Slot::Resolved(v) => Some(v),
            Slot::Missing(_) => None,
        }
    }
}

/// A way holding node values instead of arena indices.
#[derive(Debug, Clone, PartialEq)]
pub struct WayX {
    pub id: i64,
    pub kind: SemanticType,
    pub nodes: Vec<Slot<Node>>,
}

impl WayX {
    pub fn is_complete(&self) -> bool {
        self.nodes.iter().all(|n| !n.is_missing())
    }

    pub fn missing_nodes(&self) -> impl Iterator<Item = i64> + '_ {
        self.nodes.iter().filter_map(|n| match n {
            Slot::Missing(id) => Some(*id),
            Slot::Resolved(_) => None,
        })
    }

    /// Resolved node values in order, skipping holes.
    pub fn resolved_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter_map(Slot::resolved)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberValue {
    Node(Slot<Node>),
    Way(Slot<WayX>),
    Relation(Slot<RelationX>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberX {
    pub role: Role,
    pub value: MemberValue,
}

/// A relation holding member values instead of arena indices.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationX {
    pub id: i64,
    pub kind: SemanticType,
    pub members: Vec<MemberX>,
}

impl RelationX {
    /// Every member, at every depth, is resolved.
    pub fn is_complete(&self) -> bool {
        let mut stack = vec![self];
        while let Some(rel) = stack.pop() {
            for member in &rel.members {
                match &member.value {
                    MemberValue::Node(slot) => {
                        if slot.is_missing() {
                            return false;
                        }
                    }
                    MemberValue::Way(Slot::Resolved(way)) => {
                        if !way.is_complete() {
                            return false;
                        }
                    }
                    MemberValue::Relation(Slot::Resolved(inner)) => stack.push(inner),
                    MemberValue::Way(Slot::Missing(_))
                    | MemberValue::Relation(Slot::Missing(_)) => return false,
                }
            }
        }
        true
    }

    /// Nested relation at `path`, a list of member positions from `self`.
    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut RelationX> {
        let mut current = self;
        for &i in path {
            current = match current.members.get_mut(i).map(|m| &mut m.value) {
                Some(MemberValue::Relation(Slot::Resolved(inner))) => inner,
                _ => return None,
            };
        }
        Some(current)
    }
}
