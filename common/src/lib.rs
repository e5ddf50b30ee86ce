//! Layout Review Common Library
//!
//! CLIとレンダリング層で共有される型・座標計算・ワイヤーフォーマット。
//! I/Oは一切行わない。

pub mod backend;
pub mod classes;
pub mod error;
pub mod geometry;
pub mod record;
pub mod types;
pub mod viewport;

pub use backend::{BackendStatus, DetectResponse, DetectionBatch, ModelInfo, PageDetections, Thresholds};
pub use classes::{class_color, Color, DEFAULT_CLASS_COLOR};
pub use error::{Error, Result};
pub use geometry::{fit_to_container, CoordinateMapper, NotReady, Point, Rect, Size};
pub use record::{export_file_name, ImageSize, RecordBody, ResultRecord, StoreFile, UatStatus};
pub use types::{AnnotatedDetection, BBox, Detection, DetectionId, IdSequence};
pub use viewport::{Viewport, ZoomLimits};
