//! Per-LOD generalization policy: which types are drawn, and how hard
//! their geometry is reduced.

use butterfly_common::LOD_COUNT;
use butterfly_extract::SemanticType;

/// The LOD drawn without any merging or simplification.
pub const MAX_LOD: usize = LOD_COUNT - 1;

const EPSILON: [f64; LOD_COUNT] = [
    0.0016,
    0.0008,
    0.0004,
    0.0002,
    0.0001,
    0.00005,
    0.000025,
    0.0000125,
    0.00000625,
    0.000003125,
    0.0000015625,
    0.0000008,
    0.0000004,
    0.0000002,
    0.0000001,
    0.00000005,
];

const AREA_THRESHOLD: [f64; LOD_COUNT] = [
    0.16, 0.8, 0.4, 0.2, 0.1, 0.05, 0.025, 0.0125, 0.00625, 0.003125, 0.0015625, 0.0008, 0.4, 0.2,
    0.1, 0.005,
];

const RETENTION: [f64; LOD_COUNT] = [
    0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.45, 0.55, 0.65, 0.7, 0.75, 0.8, 0.85, 0.9, 0.95, 1.0,
];

/// Douglas-Peucker tolerance in degrees.
pub fn epsilon(lod: usize) -> f64 {
    EPSILON[lod.min(MAX_LOD)]
}

/// Areas below this size (square degrees) are merged or dropped.
pub fn area_threshold(lod: usize) -> f64 {
    AREA_THRESHOLD[lod.min(MAX_LOD)]
}

/// Fraction of vertices Visvalingam-Whyatt keeps.
pub fn retention(lod: usize) -> f64 {
    RETENTION[lod.min(MAX_LOD)]
}

/// Whether entities of `kind` are drawn at `lod`.
pub fn is_lod_type(lod: usize, kind: SemanticType) -> bool {
    use SemanticType::*;

    if !kind.is_drawable() {
        return false;
    }
    let house = kind.is_house();
    match lod {
        0..=2 => (kind.is_area() && !house && kind != Plaza) || kind == Nation,
        3..=7 => !matches!(kind, Plaza | TreeRow | City) && !house && !kind.is_road(),
        8..=10 => !house && !matches!(kind, TreeRow | Plaza),
        11..=12 => !house && !matches!(kind, Path | SmallRoad | TreeRow),
        13..=14 => kind != Path,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SemanticType::*;

    #[test]
    fn tables_cover_every_lod() {
        assert_eq!(epsilon(0), 0.0016);
        assert_eq!(epsilon(MAX_LOD), 0.00000005);
        assert_eq!(area_threshold(12), 0.4);
        assert_eq!(retention(MAX_LOD), 1.0);
        for lod in 1..LOD_COUNT {
            assert!(epsilon(lod) < epsilon(lod - 1));
            assert!(retention(lod) > retention(lod - 1));
        }
    }

    #[test]
    fn coarse_lods_show_large_features_only() {
        assert!(is_lod_type(0, Forest));
        assert!(is_lod_type(1, Nation));
        assert!(!is_lod_type(2, State));
        assert!(!is_lod_type(0, Apartments));
        assert!(!is_lod_type(0, LargeRoad));

        assert!(is_lod_type(5, Waterway));
        assert!(!is_lod_type(5, LargeRoad));
        assert!(!is_lod_type(7, City));
        assert!(is_lod_type(8, LargeRoad));
        assert!(is_lod_type(8, City));
        assert!(!is_lod_type(12, SmallRoad));
        assert!(is_lod_type(13, Detached));
        assert!(!is_lod_type(14, Path));
    }

    #[test]
    fn finest_lod_shows_everything_drawable() {
        for kind in [Path, Apartments, Lamp, Tree, Street, Coast] {
            assert!(is_lod_type(MAX_LOD, kind), "{kind}");
        }
        assert!(!is_lod_type(MAX_LOD, Empty));
        assert!(!is_lod_type(MAX_LOD, SemanticType::None));
    }
}
