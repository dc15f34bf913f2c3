//! Detection adapter over a segmentation backend

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use super::overlay::render_label_overlay;
use super::service::Segmenter;
use super::types::{BatchMode, DetectError, DetectionStatus, Detections};
use crate::geometry::image_center;
use crate::mask::LabelImage;

/// Whether the label at the image center is a nucleus
pub fn is_centered(labels: &LabelImage) -> bool {
    if labels.width() == 0 || labels.height() == 0 {
        return false;
    }
    let (cx, cy) = image_center(labels);
    labels.get_pixel(cx, cy).0[0] != 0
}

/// Segments cell crops and separates centered from off-center detections
pub struct CellDetector {
    segmenter: Arc<dyn Segmenter>,
    deadline: Duration,
    mode: BatchMode,
}

impl CellDetector {
    pub fn new(segmenter: Arc<dyn Segmenter>, deadline: Duration, mode: BatchMode) -> Self {
        Self {
            segmenter,
            deadline,
            mode,
        }
    }

    /// Segment every crop, in order.
    ///
    /// The primary label sequence always matches the input order. With
    /// `stash_undetected`, off-center crops are additionally rendered with
    /// their labels into [`Detections::off_center`]. In
    /// [`BatchMode::FailFast`] the first backend failure is returned with the
    /// failing cell index; otherwise it is recorded and the batch continues.
    pub async fn detect(
        &self,
        images: &[RgbImage],
        stash_undetected: bool,
        progress: &ProgressBar,
    ) -> Result<Detections, DetectError> {
        info!(
            "Running {} segmentation on {} cell crops",
            self.segmenter.name(),
            images.len()
        );

        let mut detections = Detections {
            labels: Vec::with_capacity(images.len()),
            status: Vec::with_capacity(images.len()),
            off_center: stash_undetected.then(BTreeMap::new),
            failures: Vec::new(),
        };

        for (index, image) in images.iter().enumerate() {
            match self.segment_one(image).await {
                Ok(labels) => {
                    if is_centered(&labels) {
                        detections.status.push(DetectionStatus::Centered);
                    } else if labels.pixels().all(|p| p.0[0] == 0) {
                        debug!("Cell {}: no nucleus in crop", index);
                        detections.status.push(DetectionStatus::Empty);
                    } else {
                        debug!("Cell {}: no nucleus at crop center", index);
                        if let Some(stash) = detections.off_center.as_mut() {
                            stash.insert(index, render_label_overlay(image, &labels));
                        }
                        detections.status.push(DetectionStatus::OffCenter);
                    }
                    detections.labels.push(Some(labels));
                }
                Err(e) => {
                    let e = e.for_cell(index);
                    if self.mode == BatchMode::FailFast {
                        progress.abandon();
                        return Err(e);
                    }
                    warn!("{}", e);
                    detections.labels.push(None);
                    detections.status.push(DetectionStatus::Failed);
                    detections.failures.push((index, e));
                }
            }
            progress.inc(1);
        }
        progress.finish();

        info!(
            "Found cell instances: {} centered, {} off-center, {} empty, {} failed",
            detections.centered_count(),
            detections.off_center_count(),
            detections.empty_count(),
            detections.failed_count()
        );

        Ok(detections)
    }

    /// Start the backend if needed, then run it on one crop under the
    /// deadline and check the shape
    async fn segment_one(&self, image: &RgbImage) -> Result<LabelImage, DetectError> {
        self.segmenter.start().await?;

        let start = Instant::now();
        let labels = tokio::time::timeout(self.deadline, self.segmenter.segment(image))
            .await
            .map_err(|_| DetectError::Timeout(self.deadline))??;
        debug!("Segmented crop in {:?}", start.elapsed());

        if labels.dimensions() != image.dimensions() {
            return Err(DetectError::ShapeMismatch {
                expected: image.dimensions(),
                actual: labels.dimensions(),
            });
        }
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::Luma;

    /// Returns a blob centered at a fixed offset from the crop center
    struct BlobSegmenter {
        offset: i64,
    }

    /// Blob position keyed by the crop's first pixel: 0 centered, 1 shifted,
    /// anything else nothing
    struct MarkerSegmenter;

    #[async_trait]
    impl Segmenter for MarkerSegmenter {
        fn name(&self) -> &'static str {
            "marker"
        }

        async fn segment(&self, image: &RgbImage) -> Result<LabelImage, DetectError> {
            let (w, h) = image.dimensions();
            let shift = match image.get_pixel(0, 0).0[0] {
                0 => 0,
                1 => 6,
                _ => return Ok(LabelImage::new(w, h)),
            };
            let (cx, cy) = (w / 2 + shift, h / 2);
            Ok(LabelImage::from_fn(w, h, |x, y| {
                Luma([u32::from(x.abs_diff(cx) <= 2 && y.abs_diff(cy) <= 2)])
            }))
        }
    }

    #[async_trait]
    impl Segmenter for BlobSegmenter {
        fn name(&self) -> &'static str {
            "blob"
        }

        async fn segment(&self, image: &RgbImage) -> Result<LabelImage, DetectError> {
            let (w, h) = image.dimensions();
            let (cx, cy) = ((w / 2) as i64 + self.offset, (h / 2) as i64);
            Ok(LabelImage::from_fn(w, h, |x, y| {
                let (dx, dy) = (x as i64 - cx, y as i64 - cy);
                Luma([u32::from(dx * dx + dy * dy <= 9)])
            }))
        }
    }

    struct SlowSegmenter;

    #[async_trait]
    impl Segmenter for SlowSegmenter {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn segment(&self, image: &RgbImage) -> Result<LabelImage, DetectError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(LabelImage::new(image.width(), image.height()))
        }
    }

    struct WrongShapeSegmenter;

    #[async_trait]
    impl Segmenter for WrongShapeSegmenter {
        fn name(&self) -> &'static str {
            "wrong-shape"
        }

        async fn segment(&self, image: &RgbImage) -> Result<LabelImage, DetectError> {
            Ok(LabelImage::new(image.width() + 1, image.height()))
        }
    }

    fn crops(n: usize) -> Vec<RgbImage> {
        (0..n).map(|_| RgbImage::new(20, 20)).collect()
    }

    #[test]
    fn test_is_centered() {
        let mut labels = LabelImage::new(10, 10);
        assert!(!is_centered(&labels));
        labels.put_pixel(5, 5, Luma([2]));
        assert!(is_centered(&labels));
        assert!(!is_centered(&LabelImage::new(0, 0)));
    }

    #[tokio::test]
    async fn test_single_crop_uses_same_path() {
        let detector = CellDetector::new(
            Arc::new(BlobSegmenter { offset: 0 }),
            Duration::from_secs(5),
            BatchMode::Continue,
        );
        let detections = detector
            .detect(&crops(1), true, &ProgressBar::hidden())
            .await
            .unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections.status, vec![DetectionStatus::Centered]);
        assert!(detections.off_center.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_centered_off_center_and_empty() {
        let images: Vec<RgbImage> = (0..3u8)
            .map(|marker| {
                let mut image = RgbImage::new(20, 20);
                image.put_pixel(0, 0, image::Rgb([marker, 0, 0]));
                image
            })
            .collect();
        let detector = CellDetector::new(
            Arc::new(MarkerSegmenter),
            Duration::from_secs(5),
            BatchMode::Continue,
        );
        let detections = detector
            .detect(&images, true, &ProgressBar::hidden())
            .await
            .unwrap();
        assert_eq!(detections.len(), 3);
        assert_eq!(
            detections.status,
            vec![
                DetectionStatus::Centered,
                DetectionStatus::OffCenter,
                DetectionStatus::Empty
            ]
        );
        let stash = detections.off_center.unwrap();
        assert_eq!(stash.len(), 1);
        assert!(stash.contains_key(&1));
    }

    #[tokio::test]
    async fn test_off_center_crops_are_stashed() {
        let detector = CellDetector::new(
            Arc::new(BlobSegmenter { offset: 7 }),
            Duration::from_secs(5),
            BatchMode::Continue,
        );
        let detections = detector
            .detect(&crops(2), true, &ProgressBar::hidden())
            .await
            .unwrap();
        assert_eq!(detections.labels.len(), 2);
        assert!(detections.labels.iter().all(Option::is_some));
        assert_eq!(detections.off_center_count(), 2);
        let stash = detections.off_center.unwrap();
        assert_eq!(stash.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_no_stash_when_not_requested() {
        let detector = CellDetector::new(
            Arc::new(BlobSegmenter { offset: 7 }),
            Duration::from_secs(5),
            BatchMode::Continue,
        );
        let detections = detector
            .detect(&crops(2), false, &ProgressBar::hidden())
            .await
            .unwrap();
        assert!(detections.off_center.is_none());
        assert_eq!(detections.off_center_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_marks_cell_failed() {
        let detector = CellDetector::new(
            Arc::new(SlowSegmenter),
            Duration::from_secs(1),
            BatchMode::Continue,
        );
        let detections = detector
            .detect(&crops(2), true, &ProgressBar::hidden())
            .await
            .unwrap();
        assert_eq!(detections.failed_count(), 2);
        assert!(detections.labels.iter().all(Option::is_none));
        let (index, err) = &detections.failures[1];
        assert_eq!(*index, 1);
        assert!(matches!(
            err,
            DetectError::Cell { index: 1, source } if matches!(**source, DetectError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_fast_reports_cell_index() {
        let detector = CellDetector::new(
            Arc::new(WrongShapeSegmenter),
            Duration::from_secs(5),
            BatchMode::FailFast,
        );
        let err = detector
            .detect(&crops(3), false, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::Cell { index: 0, .. }));
    }
}
