use crate::frame::Frame;
use crate::pose::{JointIndex, LandmarkSet};

/// 骨格の接続定義 (開始ランドマーク, 終了ランドマーク)
pub const SKELETON_CONNECTIONS: [(JointIndex, JointIndex); 12] = [
    // 上半身
    (JointIndex::LeftShoulder, JointIndex::RightShoulder),
    (JointIndex::LeftShoulder, JointIndex::LeftElbow),
    (JointIndex::LeftElbow, JointIndex::LeftWrist),
    (JointIndex::RightShoulder, JointIndex::RightElbow),
    (JointIndex::RightElbow, JointIndex::RightWrist),
    // 胴体
    (JointIndex::LeftShoulder, JointIndex::LeftHip),
    (JointIndex::RightShoulder, JointIndex::RightHip),
    (JointIndex::LeftHip, JointIndex::RightHip),
    // 下半身
    (JointIndex::LeftHip, JointIndex::LeftKnee),
    (JointIndex::RightHip, JointIndex::RightKnee),
    (JointIndex::LeftKnee, JointIndex::LeftAnkle),
    (JointIndex::RightKnee, JointIndex::RightAnkle),
];

/// 骨格線の色 (BGR)
pub const SKELETON_COLOR: [u8; 3] = [0, 255, 0]; // 緑

/// ランドマークの色 (BGR)
pub const LANDMARK_COLOR: [u8; 3] = [0, 0, 255]; // 赤

/// Draws edges whose endpoints are both valid, then a dot per named joint.
pub fn draw_overlay(frame: &mut Frame, landmarks: &LandmarkSet) {
    let (w, h) = (frame.width, frame.height);
    let thickness = ((w.max(h) / 400) as i32).max(1);

    for (start, end) in SKELETON_CONNECTIONS.iter() {
        if let (Some(a), Some(b)) = (landmarks.get(*start), landmarks.get(*end)) {
            let (x1, y1) = a.to_pixel(w, h);
            let (x2, y2) = b.to_pixel(w, h);
            frame.draw_line(x1, y1, x2, y2, SKELETON_COLOR, thickness);
        }
    }

    for joint in JointIndex::NAMED {
        if let Some(l) = landmarks.get(joint) {
            let (px, py) = l.to_pixel(w, h);
            frame.draw_circle(px, py, 2 + thickness, LANDMARK_COLOR);
        }
    }
}
