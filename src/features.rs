//! Per-frame geometric descriptor.
//!
//! Turns one frame of 12 body landmarks into the 22 values the sequence
//! classifier was trained on: 8 joint angles, 12 normalized distances and 2
//! normalized vertical distances, in that order. A landmark with any zero
//! coordinate counts as missing and every value derived from it is
//! [`MISSING`].

use crate::types::{
    BodyPoint::{self, *},
    FEATURE_COUNT, FeatureVector, LANDMARK_ARITY, Landmark, MISSING, NUM_LANDMARKS,
};

/// Scale used when none of the normalization candidates is usable.
pub const FALLBACK_SCALE: f32 = 0.5;

/// Joint angles as (a, vertex, c).
pub const ANGLE_TRIPLETS: [(BodyPoint, BodyPoint, BodyPoint); 8] = [
    (LeftShoulder, LeftElbow, LeftWrist),
    (RightShoulder, RightElbow, RightWrist),
    (LeftHip, LeftKnee, LeftAnkle),
    (RightHip, RightKnee, RightAnkle),
    (LeftShoulder, LeftHip, LeftKnee),
    (RightShoulder, RightHip, RightKnee),
    (LeftHip, LeftShoulder, LeftElbow),
    (RightHip, RightShoulder, RightElbow),
];

pub const DISTANCE_PAIRS: [(BodyPoint, BodyPoint); 12] = [
    (LeftShoulder, RightShoulder),
    (LeftHip, RightHip),
    (LeftHip, LeftKnee),
    (RightHip, RightKnee),
    (LeftShoulder, LeftHip),
    (RightShoulder, RightHip),
    (LeftElbow, LeftKnee),
    (RightElbow, RightKnee),
    (LeftWrist, LeftShoulder),
    (RightWrist, RightShoulder),
    (LeftWrist, LeftHip),
    (RightWrist, RightHip),
];

pub const VERTICAL_PAIRS: [(BodyPoint, BodyPoint); 2] = [
    (LeftElbow, LeftShoulder),
    (RightElbow, RightShoulder),
];

/// Candidate distances for the normalization scale, highest priority first.
pub const SCALE_CANDIDATES: [(BodyPoint, BodyPoint); 4] = [
    (LeftShoulder, LeftHip),
    (RightShoulder, RightHip),
    (LeftHip, LeftKnee),
    (RightHip, RightKnee),
];

const ANGLES_END: usize = ANGLE_TRIPLETS.len();
const DISTANCES_END: usize = ANGLES_END + DISTANCE_PAIRS.len();

const _: () = assert!(DISTANCES_END + VERTICAL_PAIRS.len() == FEATURE_COUNT);

/// Extract the feature vector for one frame.
///
/// Never fails: a frame without exactly 12 points of exactly 3 coordinates
/// yields a vector made only of [`MISSING`].
pub fn extract_features<P: AsRef<[f32]>>(landmarks: &[P]) -> FeatureVector {
    match parse_landmarks(landmarks) {
        Some(points) => features_from_points(&points),
        None => [MISSING; FEATURE_COUNT],
    }
}

fn parse_landmarks<P: AsRef<[f32]>>(landmarks: &[P]) -> Option<[Landmark; NUM_LANDMARKS]> {
    if landmarks.len() != NUM_LANDMARKS {
        return None;
    }

    let mut points = [[0.0; LANDMARK_ARITY]; NUM_LANDMARKS];
    for (slot, raw) in points.iter_mut().zip(landmarks) {
        *slot = raw.as_ref().try_into().ok()?;
    }
    Some(points)
}

fn features_from_points(points: &[Landmark; NUM_LANDMARKS]) -> FeatureVector {
    let at = |p: BodyPoint| points[p.index()];
    let mut features = [MISSING; FEATURE_COUNT];

    for (slot, &(a, b, c)) in features[..ANGLES_END].iter_mut().zip(&ANGLE_TRIPLETS) {
        *slot = joint_angle(at(a), at(b), at(c));
    }
    for (slot, &(a, b)) in features[ANGLES_END..DISTANCES_END]
        .iter_mut()
        .zip(&DISTANCE_PAIRS)
    {
        *slot = distance(at(a), at(b));
    }
    for (slot, &(a, b)) in features[DISTANCES_END..].iter_mut().zip(&VERTICAL_PAIRS) {
        *slot = vertical_distance(at(a), at(b));
    }

    let candidates = SCALE_CANDIDATES.map(|(a, b)| distance(at(a), at(b)));
    let scale = normalization_scale(&candidates);
    for value in features[ANGLES_END..].iter_mut() {
        if *value != MISSING {
            *value /= scale;
        }
    }

    features
}

/// First strictly positive candidate, or [`FALLBACK_SCALE`].
pub fn normalization_scale(candidates: &[f32]) -> f32 {
    candidates
        .iter()
        .copied()
        .find(|d| *d > 0.0)
        .unwrap_or(FALLBACK_SCALE)
}

fn is_missing(point: &Landmark) -> bool {
    point.iter().any(|c| *c == 0.0)
}

/// Angle at `b` in degrees within [0, 180], measured in the image (x, y)
/// plane.
pub fn joint_angle(a: Landmark, b: Landmark, c: Landmark) -> f32 {
    if [a, b, c].iter().any(is_missing) {
        return MISSING;
    }

    let radians = (c[1] - b[1]).atan2(c[0] - b[0]) - (a[1] - b[1]).atan2(a[0] - b[0]);
    let angle = radians.to_degrees().abs();
    if angle > 180.0 { 360.0 - angle } else { angle }
}

pub fn distance(a: Landmark, b: Landmark) -> f32 {
    if is_missing(&a) || is_missing(&b) {
        return MISSING;
    }
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

pub fn vertical_distance(a: Landmark, b: Landmark) -> f32 {
    if is_missing(&a) || is_missing(&b) {
        return MISSING;
    }
    (a[1] - b[1]).abs()
}

/// Number of features equal to [`MISSING`].
pub fn missing_count(features: &[f32]) -> usize {
    features.iter().filter(|v| **v == MISSING).count()
}
