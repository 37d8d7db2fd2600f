/// BlazePose の 33 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum JointIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl JointIndex {
    pub const COUNT: usize = 33;

    /// 分類器が参照する13関節
    pub const NAMED: [JointIndex; 13] = [
        JointIndex::Nose,
        JointIndex::LeftShoulder,
        JointIndex::RightShoulder,
        JointIndex::LeftElbow,
        JointIndex::RightElbow,
        JointIndex::LeftWrist,
        JointIndex::RightWrist,
        JointIndex::LeftHip,
        JointIndex::RightHip,
        JointIndex::LeftKnee,
        JointIndex::RightKnee,
        JointIndex::LeftAnkle,
        JointIndex::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        use JointIndex::*;
        const ALL: [JointIndex; JointIndex::COUNT] = [
            Nose, LeftEyeInner, LeftEye, LeftEyeOuter, RightEyeInner, RightEye, RightEyeOuter,
            LeftEar, RightEar, MouthLeft, MouthRight, LeftShoulder, RightShoulder, LeftElbow,
            RightElbow, LeftWrist, RightWrist, LeftPinky, RightPinky, LeftIndex, RightIndex,
            LeftThumb, RightThumb, LeftHip, RightHip, LeftKnee, RightKnee, LeftAnkle, RightAnkle,
            LeftHeel, RightHeel, LeftFootIndex, RightFootIndex,
        ];
        ALL.get(index).copied()
    }
}

/// フレーム外の許容マージン（正規化座標）
pub const VALID_MIN: f32 = -0.15;
pub const VALID_MAX: f32 = 1.15;

fn in_margin(v: f32) -> bool {
    (VALID_MIN..=VALID_MAX).contains(&v)
}

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0, 下が正)
    pub y: f32,
    /// 腰中心基準の相対深度
    pub z: f32,
    /// false なら未検出
    valid: bool,
}

impl Landmark {
    /// x, y が [-0.15, 1.15] に収まる場合のみ有効
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            valid: in_margin(x) && in_margin(y),
        }
    }

    /// 検出済みかつ x, y がマージン内
    pub fn is_valid(&self) -> bool {
        self.valid && in_margin(self.x) && in_margin(self.y)
    }

    pub fn absent() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            valid: false,
        }
    }

    /// ピクセル座標に変換
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32) as i32;
        let py = (self.y * height as f32) as i32;
        (px, py)
    }
}

impl Default for Landmark {
    fn default() -> Self {
        Self::absent()
    }
}

/// 1フレーム分のランドマーク。インデックスはフレーム間で固定。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkSet {
    landmarks: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn from_landmarks(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    /// 全スロット無効の33点
    pub fn empty() -> Self {
        Self {
            landmarks: vec![Landmark::absent(); JointIndex::COUNT],
        }
    }

    /// 範囲外・無効なら None
    pub fn get(&self, index: JointIndex) -> Option<&Landmark> {
        self.landmarks.get(index as usize).filter(|l| l.is_valid())
    }

    pub fn set(&mut self, index: JointIndex, landmark: Landmark) {
        let i = index as usize;
        if i >= self.landmarks.len() {
            self.landmarks.resize(i + 1, Landmark::absent());
        }
        self.landmarks[i] = landmark;
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// 全座標を原点中心に s 倍（有効判定は再計算）
    #[cfg(test)]
    pub fn scaled(&self, s: f32) -> Self {
        Self {
            landmarks: self
                .landmarks
                .iter()
                .map(|l| {
                    if l.is_valid() {
                        Landmark::new(l.x * s, l.y * s, l.z * s)
                    } else {
                        *l
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_index_count() {
        assert_eq!(JointIndex::COUNT, 33);
        assert_eq!(JointIndex::NAMED.len(), 13);
    }

    #[test]
    fn test_joint_index_from_index() {
        assert_eq!(JointIndex::from_index(0), Some(JointIndex::Nose));
        assert_eq!(JointIndex::from_index(23), Some(JointIndex::LeftHip));
        assert_eq!(JointIndex::from_index(32), Some(JointIndex::RightFootIndex));
        assert_eq!(JointIndex::from_index(33), None);
        for i in 0..JointIndex::COUNT {
            assert_eq!(JointIndex::from_index(i).map(|j| j as usize), Some(i));
        }
    }

    #[test]
    fn test_landmark_validity_margin() {
        assert!(Landmark::new(0.5, 0.5, 0.0).is_valid());
        assert!(Landmark::new(-0.15, 1.15, 0.0).is_valid());
        assert!(Landmark::new(1.1, -0.1, 0.0).is_valid());
        assert!(!Landmark::new(-0.16, 0.5, 0.0).is_valid());
        assert!(!Landmark::new(0.5, 1.2, 0.0).is_valid());
        assert!(!Landmark::new(f32::NAN, 0.5, 0.0).is_valid());
    }

    #[test]
    fn test_modified_coordinates_stay_invalid_outside_margin() {
        // 座標を後から書き換えても有効判定は範囲で決まる
        let mut lm = Landmark::new(0.5, 0.5, 0.0);
        lm.x = 5.0;
        let mut set = LandmarkSet::empty();
        set.set(JointIndex::LeftHip, lm);
        assert!(set.get(JointIndex::LeftHip).is_none());

        lm.x = 0.4;
        set.set(JointIndex::LeftHip, lm);
        assert!(set.get(JointIndex::LeftHip).is_some());
        assert!(!Landmark::absent().is_valid());
    }

    #[test]
    fn test_landmark_to_pixel() {
        let lm = Landmark::new(0.5, 0.25, 0.0);
        assert_eq!(lm.to_pixel(640, 480), (320, 120));
    }

    #[test]
    fn test_short_set_missing_index_is_absent() {
        let set = LandmarkSet::from_landmarks(vec![Landmark::new(0.5, 0.5, 0.0); 12]);
        assert!(set.get(JointIndex::Nose).is_some());
        assert!(set.get(JointIndex::RightShoulder).is_none());
        assert!(set.get(JointIndex::RightAnkle).is_none());
    }

    #[test]
    fn test_invalid_landmark_is_absent() {
        let mut set = LandmarkSet::empty();
        set.set(JointIndex::LeftHip, Landmark::new(2.0, 0.5, 0.0));
        assert!(set.get(JointIndex::LeftHip).is_none());
        set.set(JointIndex::LeftHip, Landmark::new(0.4, 0.5, 0.0));
        assert_eq!(set.get(JointIndex::LeftHip).map(|l| l.x), Some(0.4));
    }

    #[test]
    fn test_set_grows_short_sequence() {
        let mut set = LandmarkSet::from_landmarks(Vec::new());
        set.set(JointIndex::RightAnkle, Landmark::new(0.5, 0.9, 0.0));
        assert_eq!(set.len(), 29);
        assert!(set.get(JointIndex::RightAnkle).is_some());
        assert!(set.get(JointIndex::Nose).is_none());
    }
}
