use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumString, FromRepr};

/// Document classes recognised by the classifier, in model output order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumCount, FromRepr,
)]
pub enum ClassLabel {
    #[serde(rename = "Public Bank")]
    #[strum(serialize = "Public Bank")]
    PublicBank,
    Rototype,
    #[serde(rename = "Standard Charted")]
    #[strum(serialize = "Standard Charted")]
    StandardCharted,
}

/// Object classes emitted by the detector, indexed by class id.
///
/// Independent of [`ClassLabel`]; the two models were trained on different label sets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumCount, FromRepr,
)]
pub enum DetectionLabel {
    Test,
    Logo,
    Payee,
}

/// Axis-aligned box in source-image pixel coordinates.
///
/// Always normalised so that `x1 <= x2` and `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn is_finite(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2].iter().all(|c| c.is_finite())
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self::new(x1, y1, x2, y2)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Best label for an image with its probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: ClassLabel,
    /// Probability in `[0, 1]`.
    pub confidence: f64,
}

/// One localised object, with its class id resolved against [`DetectionLabel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub label: DetectionLabel,
    /// Probability in `[0, 1]`.
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

/// Detector output before label resolution and thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f64,
    pub bbox: BoundingBox,
}
