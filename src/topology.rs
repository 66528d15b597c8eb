//! Fixed index contract of the landmark models.
//!
//! These indices are part of the models' output topology, not tunables.
//! They are kept in one place so no stage hardcodes them inline.

/// Vertex count of the face-mesh model output.
pub const FACE_VERTEX_COUNT: usize = 468;

/// Eye model output: contour+brow vertices followed by iris vertices.
pub const EYE_CONTOUR_VERTEX_COUNT: usize = 71;
pub const IRIS_VERTEX_COUNT: usize = 5;
pub const EYE_VERTEX_COUNT: usize = EYE_CONTOUR_VERTEX_COUNT + IRIS_VERTEX_COUNT;

/// Semantic face-mesh vertices consumed by the tracker.
pub const NOSE_TIP: usize = 1;
pub const MID_EYES: usize = 168;
pub const UPPER_LIP: usize = 13;
pub const LEFT_EYE_OUTER: usize = 33;
pub const LEFT_EYE_INNER: usize = 133;
pub const RIGHT_EYE_INNER: usize = 362;
pub const RIGHT_EYE_OUTER: usize = 263;

/// Remap of the eye model's first 16 contour vertices onto their slots in
/// the face mesh, (eye vertex, face vertex). The ring starts at the outer
/// corner and runs along the lower then upper lid.
pub const LEFT_EYE_TO_FACE: [(usize, usize); 16] = [
    (0, 33),
    (1, 7),
    (2, 163),
    (3, 144),
    (4, 145),
    (5, 153),
    (6, 154),
    (7, 155),
    (8, 133),
    (9, 246),
    (10, 161),
    (11, 160),
    (12, 159),
    (13, 158),
    (14, 157),
    (15, 173),
];

pub const RIGHT_EYE_TO_FACE: [(usize, usize); 16] = [
    (0, 263),
    (1, 249),
    (2, 390),
    (3, 373),
    (4, 374),
    (5, 380),
    (6, 381),
    (7, 382),
    (8, 362),
    (9, 466),
    (10, 388),
    (11, 387),
    (12, 386),
    (13, 385),
    (14, 384),
    (15, 398),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_tables_stay_inside_face_mesh() {
        for &(eye, face) in LEFT_EYE_TO_FACE.iter().chain(RIGHT_EYE_TO_FACE.iter()) {
            assert!(eye < EYE_CONTOUR_VERTEX_COUNT, "eye index {} out of range", eye);
            assert!(face < FACE_VERTEX_COUNT, "face index {} out of range", face);
        }
    }

    #[test]
    fn remap_tables_contain_eye_corners() {
        assert!(LEFT_EYE_TO_FACE.iter().any(|&(_, f)| f == LEFT_EYE_OUTER));
        assert!(LEFT_EYE_TO_FACE.iter().any(|&(_, f)| f == LEFT_EYE_INNER));
        assert!(RIGHT_EYE_TO_FACE.iter().any(|&(_, f)| f == RIGHT_EYE_OUTER));
        assert!(RIGHT_EYE_TO_FACE.iter().any(|&(_, f)| f == RIGHT_EYE_INNER));
    }
}
