//! Landmark set -> exercise label.
//!
//! Thresholds are multiples of the torso height (shoulder-mid to hip-mid
//! distance) unless noted. Rules are evaluated in a fixed priority order and
//! the first match wins.

use std::fmt;

use super::landmark::{JointIndex, Landmark, LandmarkSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PoseLabel {
    #[default]
    None,
    PlaceLeft,
    PlaceRight,
    Squat,
    JumpingJacksOpen,
    JumpingJacksClosed,
    RightLunge,
    LeftLunge,
    KneeUpL,
    KneeUpR,
    Standing,
    PushUp,
    PushUpDown,
}

impl PoseLabel {
    pub const ALL: [PoseLabel; 13] = [
        PoseLabel::None,
        PoseLabel::PlaceLeft,
        PoseLabel::PlaceRight,
        PoseLabel::Squat,
        PoseLabel::JumpingJacksOpen,
        PoseLabel::JumpingJacksClosed,
        PoseLabel::RightLunge,
        PoseLabel::LeftLunge,
        PoseLabel::KneeUpL,
        PoseLabel::KneeUpR,
        PoseLabel::Standing,
        PoseLabel::PushUp,
        PoseLabel::PushUpDown,
    ];

    /// ラベルチャネルで送る名前
    pub fn as_str(&self) -> &'static str {
        match self {
            PoseLabel::None => "none",
            PoseLabel::PlaceLeft => "place_left",
            PoseLabel::PlaceRight => "place_right",
            PoseLabel::Squat => "squat",
            PoseLabel::JumpingJacksOpen => "jumping_jacks_open",
            PoseLabel::JumpingJacksClosed => "jumping_jacks_closed",
            PoseLabel::RightLunge => "right_lunge",
            PoseLabel::LeftLunge => "left_lunge",
            PoseLabel::KneeUpL => "knee_up_l",
            PoseLabel::KneeUpR => "knee_up_r",
            PoseLabel::Standing => "standing",
            PoseLabel::PushUp => "push_up",
            PoseLabel::PushUpDown => "push_up_down",
        }
    }
}

impl fmt::Display for PoseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct Point {
    x: f32,
    y: f32,
}

impl Point {
    fn of(l: &Landmark) -> Self {
        Self { x: l.x, y: l.y }
    }

    fn midpoint(a: Point, b: Point) -> Self {
        Self {
            x: (a.x + b.x) / 2.0,
            y: (a.y + b.y) / 2.0,
        }
    }

    fn distance(a: Point, b: Point) -> f32 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    }
}

/// 分類に必要な関節（肘は jumping_jacks_open のみ参照、鼻は未使用）
struct Joints {
    left_shoulder: Point,
    right_shoulder: Point,
    left_elbow: Option<Point>,
    right_elbow: Option<Point>,
    left_wrist: Point,
    right_wrist: Point,
    left_hip: Point,
    right_hip: Point,
    left_knee: Point,
    right_knee: Point,
    left_ankle: Point,
    right_ankle: Point,
}

impl Joints {
    fn from_landmarks(landmarks: &LandmarkSet) -> Option<Self> {
        let p = |j: JointIndex| landmarks.get(j).map(Point::of);
        Some(Self {
            left_hip: p(JointIndex::LeftHip)?,
            right_hip: p(JointIndex::RightHip)?,
            left_shoulder: p(JointIndex::LeftShoulder)?,
            right_shoulder: p(JointIndex::RightShoulder)?,
            left_knee: p(JointIndex::LeftKnee)?,
            right_knee: p(JointIndex::RightKnee)?,
            left_ankle: p(JointIndex::LeftAnkle)?,
            right_ankle: p(JointIndex::RightAnkle)?,
            left_wrist: p(JointIndex::LeftWrist)?,
            right_wrist: p(JointIndex::RightWrist)?,
            left_elbow: p(JointIndex::LeftElbow),
            right_elbow: p(JointIndex::RightElbow),
        })
    }
}

/// Derived body measures shared by every rule.
struct Body {
    j: Joints,
    hip_mid: Point,
    shoulder_mid: Point,
    ankle_mid: Point,
    wrist_mid: Point,
    torso_height: f32,
    torso_width: f32,
}

const UPRIGHT_RATIO: f32 = 0.85;

/// Pure and total: any missing mandatory joint yields `PoseLabel::None`.
pub fn classify(landmarks: &LandmarkSet) -> PoseLabel {
    if landmarks.is_empty() {
        return PoseLabel::None;
    }
    let Some(j) = Joints::from_landmarks(landmarks) else {
        return PoseLabel::None;
    };

    let hip_mid = Point::midpoint(j.left_hip, j.right_hip);
    let shoulder_mid = Point::midpoint(j.left_shoulder, j.right_shoulder);
    let body = Body {
        hip_mid,
        shoulder_mid,
        ankle_mid: Point::midpoint(j.left_ankle, j.right_ankle),
        wrist_mid: Point::midpoint(j.left_wrist, j.right_wrist),
        torso_height: Point::distance(shoulder_mid, hip_mid),
        torso_width: (j.left_shoulder.x - j.right_shoulder.x).abs(),
        j,
    };

    if (body.shoulder_mid.y - body.hip_mid.y).abs() > body.torso_height * UPRIGHT_RATIO {
        classify_upright(&body)
    } else {
        classify_prone(&body)
    }
}

fn classify_upright(b: &Body) -> PoseLabel {
    let j = &b.j;
    let th = b.torso_height;

    // 正面向きで片腕を横に伸ばす
    let facing = b.torso_width > th * 0.3;
    if facing
        && j.left_wrist.x < j.left_shoulder.x
        && j.right_wrist.x < j.right_shoulder.x - th * 0.4
    {
        return PoseLabel::PlaceLeft;
    }
    if facing
        && j.right_wrist.x > j.right_shoulder.x
        && j.left_wrist.x > j.left_shoulder.x + th * 0.4
    {
        return PoseLabel::PlaceRight;
    }

    // Fixed offset in normalized image units, not torso-relative.
    if j.left_knee.y - j.left_hip.y < 0.1 && j.right_knee.y - j.right_hip.y < 0.1 {
        return PoseLabel::Squat;
    }

    let wrist_dx = (j.left_wrist.x - j.right_wrist.x).abs();
    let knee_dx = (j.left_knee.x - j.right_knee.x).abs();
    let ankle_dx = (j.left_ankle.x - j.right_ankle.x).abs();
    let wrists_above_ankles = j.left_wrist.y < j.left_ankle.y && j.right_wrist.y < j.right_ankle.y;

    if let (Some(le), Some(re)) = (j.left_elbow, j.right_elbow) {
        let elbow_dx = (le.x - re.x).abs();
        if elbow_dx > th * 0.8
            && knee_dx > th * 0.35
            && wrist_dx < elbow_dx
            && j.left_wrist.y < j.left_shoulder.y
            && j.right_wrist.y < j.right_shoulder.y
            && wrists_above_ankles
        {
            return PoseLabel::JumpingJacksOpen;
        }
    }

    let wrist_floor = b.hip_mid.y - th * 0.2;
    if j.left_wrist.y >= wrist_floor
        && j.right_wrist.y >= wrist_floor
        && wrists_above_ankles
        && wrist_dx < th
        && ankle_dx < th * 0.5
    {
        return PoseLabel::JumpingJacksClosed;
    }

    // 横向き（肩幅+腰幅が狭い）で足を前後に開く
    let side_on = (j.left_shoulder.x - j.right_shoulder.x).abs()
        + (j.left_hip.x - j.right_hip.x).abs()
        < th * 0.3;
    if (j.right_ankle.x - j.right_knee.x).abs() > th * 0.2 && ankle_dx > th && side_on {
        return PoseLabel::RightLunge;
    }
    if (j.left_ankle.x - j.left_knee.x).abs() > th * 0.1 && ankle_dx > th && side_on {
        return PoseLabel::LeftLunge;
    }

    if j.left_knee.y - j.left_hip.y < th * 0.1 {
        return PoseLabel::KneeUpL;
    }
    if j.right_knee.y - j.right_hip.y < th * 0.1 {
        return PoseLabel::KneeUpR;
    }

    if ankle_dx < th * 0.5 && (b.hip_mid.y - b.ankle_mid.y).abs() > th * 1.1 {
        return PoseLabel::Standing;
    }

    PoseLabel::None
}

fn classify_prone(b: &Body) -> PoseLabel {
    // プランク姿勢: 手首と足首が水平方向に十分離れている
    if (b.wrist_mid.x - b.ankle_mid.x).abs() <= b.torso_height * 1.5 {
        return PoseLabel::None;
    }

    // Fixed offsets in normalized image units.
    let shoulder_y = b.shoulder_mid.y;
    let hip_y = b.hip_mid.y;
    let ankle_y = b.ankle_mid.y;
    let wrist_y = b.wrist_mid.y;

    if (shoulder_y - hip_y).abs() < 0.1
        && (hip_y - ankle_y).abs() < 0.1
        && (shoulder_y - ankle_y).abs() < 0.1
        && (wrist_y - shoulder_y).abs() < 0.2
    {
        return PoseLabel::PushUpDown;
    }

    if hip_y - shoulder_y < 0.2 && ankle_y - hip_y < 0.2 && wrist_y - shoulder_y > 0.1 {
        return PoseLabel::PushUp;
    }

    PoseLabel::None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// (joint, x, y) のリストから LandmarkSet を作る
    fn make_set(points: &[(JointIndex, f32, f32)]) -> LandmarkSet {
        let mut set = LandmarkSet::empty();
        for &(j, x, y) in points {
            set.set(j, Landmark::new(x, y, 0.0));
        }
        set
    }

    fn with(base: &[(JointIndex, f32, f32)], overrides: &[(JointIndex, f32, f32)]) -> LandmarkSet {
        let mut set = make_set(base);
        for &(j, x, y) in overrides {
            set.set(j, Landmark::new(x, y, 0.0));
        }
        set
    }

    /// 正面向き直立、腕は体側（torso_height = 0.3）
    fn standing_base() -> Vec<(JointIndex, f32, f32)> {
        use JointIndex::*;
        vec![
            (Nose, 0.5, 0.15),
            (LeftShoulder, 0.45, 0.3),
            (RightShoulder, 0.55, 0.3),
            (LeftElbow, 0.44, 0.45),
            (RightElbow, 0.56, 0.45),
            (LeftWrist, 0.46, 0.58),
            (RightWrist, 0.54, 0.58),
            (LeftHip, 0.47, 0.6),
            (RightHip, 0.53, 0.6),
            (LeftKnee, 0.47, 0.78),
            (RightKnee, 0.53, 0.78),
            (LeftAnkle, 0.47, 0.97),
            (RightAnkle, 0.53, 0.97),
        ]
    }

    #[test]
    fn test_label_names() {
        assert_eq!(PoseLabel::None.as_str(), "none");
        assert_eq!(PoseLabel::JumpingJacksClosed.to_string(), "jumping_jacks_closed");
        assert_eq!(PoseLabel::KneeUpL.as_str(), "knee_up_l");
        assert_eq!(PoseLabel::default(), PoseLabel::None);
        let longest = PoseLabel::ALL.iter().map(|l| l.as_str().len()).max().unwrap();
        assert!(longest < 32);
    }

    #[test]
    fn test_missing_mandatory_joint_is_none() {
        use JointIndex::*;
        let mandatory = [
            LeftHip, RightHip, LeftShoulder, RightShoulder, LeftKnee, RightKnee, LeftAnkle,
            RightAnkle, LeftWrist, RightWrist,
        ];
        let base = standing_base();
        // 元の姿勢は何らかのラベルになる
        assert_ne!(classify(&make_set(&base)), PoseLabel::None);
        for joint in mandatory {
            let set = with(&base, &[(joint, 5.0, 5.0)]);
            assert_eq!(classify(&set), PoseLabel::None, "missing {:?}", joint);
        }
    }

    #[test]
    fn test_short_sequence_is_none() {
        let set = LandmarkSet::from_landmarks(vec![Landmark::new(0.5, 0.5, 0.0); 20]);
        assert_eq!(classify(&set), PoseLabel::None);
    }

    #[test]
    fn test_empty_sequence_is_none() {
        assert_eq!(classify(&LandmarkSet::from_landmarks(Vec::new())), PoseLabel::None);
    }

    #[test]
    fn test_all_invalid_is_none() {
        let set = LandmarkSet::from_landmarks(vec![Landmark::new(-1.0, 2.0, 0.0); 33]);
        assert_eq!(classify(&set), PoseLabel::None);
    }

    #[test]
    fn test_arms_down_is_jumping_jacks_closed() {
        // jumping_jacks_closed は standing より優先される
        assert_eq!(classify(&make_set(&standing_base())), PoseLabel::JumpingJacksClosed);
    }

    #[test]
    fn test_standing_with_arms_at_chest() {
        use JointIndex::*;
        let set = with(&standing_base(), &[(LeftWrist, 0.46, 0.38), (RightWrist, 0.54, 0.38)]);
        assert_eq!(classify(&set), PoseLabel::Standing);
    }

    #[test]
    fn test_place_left() {
        use JointIndex::*;
        // 右手首を左側へ大きく伸ばす
        let set = with(&standing_base(), &[(LeftWrist, 0.40, 0.4), (RightWrist, 0.35, 0.3)]);
        assert_eq!(classify(&set), PoseLabel::PlaceLeft);
    }

    #[test]
    fn test_place_right() {
        use JointIndex::*;
        let set = with(&standing_base(), &[(LeftWrist, 0.65, 0.3), (RightWrist, 0.60, 0.4)]);
        assert_eq!(classify(&set), PoseLabel::PlaceRight);
    }

    #[test]
    fn test_squat() {
        use JointIndex::*;
        let set = with(
            &standing_base(),
            &[(LeftKnee, 0.40, 0.65), (RightKnee, 0.60, 0.65), (LeftWrist, 0.46, 0.38), (RightWrist, 0.54, 0.38)],
        );
        assert_eq!(classify(&set), PoseLabel::Squat);
    }

    #[test]
    fn test_squat_wins_over_standing() {
        use JointIndex::*;
        let set = with(
            &standing_base(),
            &[(LeftKnee, 0.47, 0.62), (RightKnee, 0.53, 0.62), (LeftWrist, 0.46, 0.38), (RightWrist, 0.54, 0.38)],
        );
        // 膝以外は standing と同一（足首・腰の条件は standing を満たす）
        let standing = with(&standing_base(), &[(LeftWrist, 0.46, 0.38), (RightWrist, 0.54, 0.38)]);
        assert_eq!(classify(&standing), PoseLabel::Standing);
        assert_eq!(classify(&set), PoseLabel::Squat);
    }

    #[test]
    fn test_jumping_jacks_open() {
        use JointIndex::*;
        let set = with(
            &standing_base(),
            &[
                (LeftElbow, 0.30, 0.2),
                (RightElbow, 0.70, 0.2),
                (LeftWrist, 0.38, 0.1),
                (RightWrist, 0.62, 0.1),
                (LeftKnee, 0.40, 0.75),
                (RightKnee, 0.60, 0.75),
                (LeftAnkle, 0.35, 0.9),
                (RightAnkle, 0.65, 0.9),
            ],
        );
        assert_eq!(classify(&set), PoseLabel::JumpingJacksOpen);
    }

    #[test]
    fn test_jumping_jacks_open_needs_elbows() {
        use JointIndex::*;
        let mut set = with(
            &standing_base(),
            &[
                (LeftWrist, 0.38, 0.1),
                (RightWrist, 0.62, 0.1),
                (LeftKnee, 0.40, 0.75),
                (RightKnee, 0.60, 0.75),
                (LeftAnkle, 0.35, 0.9),
                (RightAnkle, 0.65, 0.9),
            ],
        );
        set.set(LeftElbow, Landmark::absent());
        assert_ne!(classify(&set), PoseLabel::JumpingJacksOpen);
    }

    /// 横向き（右向き）で足を前後に開いた姿勢
    fn side_base() -> Vec<(JointIndex, f32, f32)> {
        use JointIndex::*;
        vec![
            (LeftShoulder, 0.50, 0.3),
            (RightShoulder, 0.51, 0.3),
            (LeftElbow, 0.50, 0.45),
            (RightElbow, 0.51, 0.45),
            (LeftWrist, 0.50, 0.4),
            (RightWrist, 0.51, 0.4),
            (LeftHip, 0.50, 0.6),
            (RightHip, 0.51, 0.6),
        ]
    }

    #[test]
    fn test_right_lunge() {
        use JointIndex::*;
        let set = with(
            &side_base(),
            &[(LeftKnee, 0.40, 0.75), (LeftAnkle, 0.35, 0.9), (RightKnee, 0.62, 0.75), (RightAnkle, 0.75, 0.9)],
        );
        assert_eq!(classify(&set), PoseLabel::RightLunge);
    }

    #[test]
    fn test_left_lunge() {
        use JointIndex::*;
        // 右足首は膝の真下、左足首は膝から torso_height * 0.1 を超えてずれる
        let set = with(
            &side_base(),
            &[(LeftKnee, 0.30, 0.75), (LeftAnkle, 0.25, 0.9), (RightKnee, 0.65, 0.75), (RightAnkle, 0.66, 0.9)],
        );
        assert_eq!(classify(&set), PoseLabel::LeftLunge);
    }

    #[test]
    fn test_knee_up_left() {
        use JointIndex::*;
        // 左膝 - 左腰 = torso_height * 0.05、右足は通常
        let th = 0.3_f32;
        let set = with(
            &standing_base(),
            &[(LeftKnee, 0.47, 0.6 + th * 0.05), (LeftWrist, 0.46, 0.38), (RightWrist, 0.54, 0.38)],
        );
        assert_eq!(classify(&set), PoseLabel::KneeUpL);
    }

    #[test]
    fn test_knee_up_right() {
        use JointIndex::*;
        let set = with(
            &standing_base(),
            &[(RightKnee, 0.53, 0.61), (LeftWrist, 0.46, 0.38), (RightWrist, 0.54, 0.38)],
        );
        assert_eq!(classify(&set), PoseLabel::KneeUpR);
    }

    /// 横向きのプランク（頭が左、torso_height ≈ 0.3）
    fn plank_base() -> Vec<(JointIndex, f32, f32)> {
        use JointIndex::*;
        vec![
            (LeftShoulder, 0.30, 0.60),
            (RightShoulder, 0.30, 0.60),
            (LeftWrist, 0.20, 0.80),
            (RightWrist, 0.20, 0.80),
            (LeftHip, 0.60, 0.55),
            (RightHip, 0.60, 0.55),
            (LeftKnee, 0.75, 0.60),
            (RightKnee, 0.75, 0.60),
            (LeftAnkle, 0.90, 0.68),
            (RightAnkle, 0.90, 0.68),
        ]
    }

    #[test]
    fn test_push_up() {
        // 肩が腰より 0.05 上、各高さは 0.2 以内、手首は肩より 0.2 下
        assert_eq!(classify(&make_set(&plank_base())), PoseLabel::PushUp);
    }

    #[test]
    fn test_push_up_shoulder_below_hip() {
        use JointIndex::*;
        // 肩が腰より 0.15 下
        let set = with(
            &plank_base(),
            &[(LeftShoulder, 0.30, 0.70), (RightShoulder, 0.30, 0.70), (LeftWrist, 0.15, 0.85), (RightWrist, 0.15, 0.85)],
        );
        assert_eq!(classify(&set), PoseLabel::PushUp);
    }

    #[test]
    fn test_push_up_down() {
        use JointIndex::*;
        let set = with(
            &plank_base(),
            &[
                (LeftShoulder, 0.30, 0.62),
                (RightShoulder, 0.30, 0.62),
                (LeftHip, 0.60, 0.60),
                (RightHip, 0.60, 0.60),
                (LeftAnkle, 0.90, 0.64),
                (RightAnkle, 0.90, 0.64),
                (LeftWrist, 0.15, 0.70),
                (RightWrist, 0.15, 0.70),
            ],
        );
        assert_eq!(classify(&set), PoseLabel::PushUpDown);
    }

    #[test]
    fn test_prone_without_plank_spread_is_none() {
        use JointIndex::*;
        // 手首が足首の近く
        let set = with(&plank_base(), &[(LeftWrist, 0.85, 0.8), (RightWrist, 0.85, 0.8)]);
        assert_eq!(classify(&set), PoseLabel::None);
    }

    #[test]
    fn test_scale_invariance_of_torso_relative_rules() {
        use JointIndex::*;
        let poses = [
            with(&standing_base(), &[(LeftWrist, 0.46, 0.38), (RightWrist, 0.54, 0.38)]),
            with(&standing_base(), &[(LeftWrist, 0.40, 0.4), (RightWrist, 0.35, 0.3)]),
            make_set(&standing_base()),
            with(
                &standing_base(),
                &[(LeftKnee, 0.47, 0.615), (LeftWrist, 0.46, 0.38), (RightWrist, 0.54, 0.38)],
            ),
        ];
        for set in &poses {
            let expected = classify(set);
            for s in [0.7_f32, 0.9, 1.1] {
                assert_eq!(classify(&set.scaled(s)), expected, "scale {} for {:?}", s, expected);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let set = make_set(&plank_base());
        let first = classify(&set);
        for _ in 0..10 {
            assert_eq!(classify(&set), first);
        }
    }
}
